//! Tests for the 'run' command
//!
//! The run command executes one backup or every enabled backup concurrently.

use dump_manager::config::{resolve_all_jobs, GlobalConfig};
use dump_manager::utils::JobLock;
use dump_manager::{BackupManager, ErrorKind};
use serial_test::serial;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use test_utils::{
    sample_job, ConfigBuilder, MockDumper, MockNotifier, MockTransferClient, MockTransferFactory,
    OptionAssertions, ResultAssertions,
};
use tempfile::TempDir;

fn mocked_manager(
    jobs: HashMap<String, dump_manager::ResolvedJobDescriptor>,
    lock_dir: &Path,
    client: MockTransferClient,
    dumper: MockDumper,
) -> BackupManager {
    BackupManager::with_operations(
        jobs,
        lock_dir,
        Arc::new(MockTransferFactory::new(client)),
        Arc::new(dumper),
        Arc::new(MockNotifier::new()),
    )
}

#[tokio::test]
async fn test_run_all_skips_disabled() {
    let builder = ConfigBuilder::minimal()
        .add_backup("one")
        .add_backup("two")
        .add_disabled_backup("off");
    let lock_dir = builder.temp_dir().join("locks");
    let (config, _temp) = builder.persist();
    let jobs = resolve_all_jobs(&config).unwrap();

    let client = MockTransferClient::new();
    let manager = mocked_manager(jobs, &lock_dir, client.clone(), MockDumper::new());

    let summary = manager.run_all().await;

    assert!(summary.all_succeeded());
    let mut succeeded = summary.succeeded.clone();
    succeeded.sort();
    assert_eq!(succeeded, vec!["one", "two"]);
    assert_eq!(summary.skipped, vec!["off"]);
    assert_eq!(client.uploads().len(), 2);
}

#[tokio::test]
async fn test_run_all_reports_each_failure() {
    let temp = TempDir::new().unwrap();
    let mut jobs = HashMap::new();
    jobs.insert("shop".to_string(), sample_job("shop", temp.path()));
    jobs.insert("blog".to_string(), sample_job("blog", temp.path()));

    let dumper = MockDumper::new().with_failure("Access denied for user 'backup'");
    let manager = mocked_manager(jobs, temp.path(), MockTransferClient::new(), dumper);

    let summary = manager.run_all().await;

    assert!(!summary.all_succeeded());
    assert_eq!(summary.failed.len(), 2);
    assert!(summary
        .failed
        .iter()
        .all(|(_, reason)| reason.contains("Access denied")));
}

#[tokio::test]
async fn test_run_single_backup() {
    let temp = TempDir::new().unwrap();
    let mut jobs = HashMap::new();
    jobs.insert("shop".to_string(), sample_job("shop", temp.path()));

    let client = MockTransferClient::new();
    let manager = mocked_manager(jobs, temp.path(), client.clone(), MockDumper::new());

    let outcome = manager.run_job("shop").await.assert_ok().assert_some();

    assert!(outcome.success);
    assert!(outcome.remote_file.assert_some().starts_with(&temp.path().join("dest").display().to_string()));
    assert_eq!(client.uploads().len(), 1);
}

#[tokio::test]
async fn test_run_unknown_backup() {
    let temp = TempDir::new().unwrap();
    let manager = mocked_manager(
        HashMap::new(),
        temp.path(),
        MockTransferClient::new(),
        MockDumper::new(),
    );

    manager.run_job("missing").await.assert_err_contains("missing");
}

#[tokio::test]
async fn test_run_transfer_failure_is_reported_as_outcome() {
    let temp = TempDir::new().unwrap();
    let mut jobs = HashMap::new();
    jobs.insert("shop".to_string(), sample_job("shop", temp.path()));

    let client = MockTransferClient::new().with_failure("connect", "connection refused");
    let manager = mocked_manager(jobs, temp.path(), client, MockDumper::new());

    let outcome = manager.run_job("shop").await.assert_ok().assert_some();

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Connect));
}

// Uses the process-wide default lock directory
#[tokio::test]
#[serial]
async fn test_run_refuses_while_lock_is_held() {
    let temp = TempDir::new().unwrap();
    let lock_dir = GlobalConfig::default().lock_directory;
    let id = "dump-manager-tests-locked";

    let mut jobs = HashMap::new();
    jobs.insert(id.to_string(), sample_job(id, temp.path()));
    let dumper = MockDumper::new();
    let manager = mocked_manager(jobs, &lock_dir, MockTransferClient::new(), dumper.clone());

    let mut held = JobLock::open(&lock_dir, id).unwrap();
    let guard = held.try_acquire().unwrap();

    manager.run_job(id).await.assert_err();
    assert!(dumper.get_calls().is_empty());

    drop(guard);
    let outcome = manager.run_job(id).await.assert_ok().assert_some();
    assert!(outcome.success);
}
