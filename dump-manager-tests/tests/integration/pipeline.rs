//! End-to-end pipeline tests
//!
//! Dump content comes from the mock dumper; compression, encryption, the
//! local transfer client and retention are the real implementations.

use super::common::{leftover_artifacts, local_manager, mocked_remote_manager};
use dump_manager::config::Secret;
use dump_manager::utils::compression::decompress_file;
use dump_manager::utils::encryption::{decrypt_bytes, SALT_SIZE};
use dump_manager::{ErrorKind, JobStage};
use std::sync::Arc;
use test_utils::{
    backup_names, files_in, sample_job, MockDumper, MockNotifier, MockTransferClient,
    OptionAssertions, ResultAssertions, TestContext, TransferCall,
};

#[tokio::test]
async fn test_compressed_backup_lands_in_local_destination() {
    let ctx = TestContext::new();
    let mut job = sample_job("shop", ctx.temp_dir());
    job.compression_enabled = true;
    let dest = ctx.temp_dir().join("dest");

    let manager = local_manager(
        job.clone(),
        ctx.temp_dir(),
        Arc::new(MockDumper::new().with_content(b"DATA")),
        MockNotifier::new(),
    );
    let outcome = manager.run_job("shop").await.assert_ok().assert_some();

    assert!(outcome.success, "{:?}", outcome.error);
    let files = files_in(&dest);
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("shop_"));
    assert!(files[0].ends_with(".sql.xz"));

    let restored = decompress_file(&dest.join(&files[0])).assert_ok();
    assert_eq!(std::fs::read(restored).unwrap(), b"DATA");

    assert!(leftover_artifacts(&job).is_empty());
}

#[tokio::test]
async fn test_encrypted_backup_only_opens_with_passphrase() {
    let ctx = TestContext::new();
    let mut job = sample_job("shop", ctx.temp_dir());
    job.encryption_passphrase = Some(Secret::new("secret"));
    let dest = ctx.temp_dir().join("dest");

    let manager = local_manager(
        job.clone(),
        ctx.temp_dir(),
        Arc::new(MockDumper::new().with_content(b"DATA")),
        MockNotifier::new(),
    );
    let outcome = manager.run_job("shop").await.assert_ok().assert_some();

    assert!(outcome.success, "{:?}", outcome.error);
    assert!(outcome.visited(JobStage::Encrypting));
    assert!(!outcome.visited(JobStage::Compressing));

    let files = files_in(&dest);
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with(".sql.enc"));

    let data = std::fs::read(dest.join(&files[0])).unwrap();
    assert!(data.len() > SALT_SIZE);
    assert_eq!(decrypt_bytes(&data, &Secret::new("secret")).assert_ok(), b"DATA");
    decrypt_bytes(&data, &Secret::new("Secret")).assert_err();

    assert!(leftover_artifacts(&job).is_empty());
}

#[tokio::test]
async fn test_compressed_and_encrypted_backup() {
    let ctx = TestContext::new();
    let mut job = sample_job("shop", ctx.temp_dir());
    job.compression_enabled = true;
    job.encryption_passphrase = Some(Secret::new("secret"));

    let manager = local_manager(
        job.clone(),
        ctx.temp_dir(),
        Arc::new(MockDumper::new()),
        MockNotifier::new(),
    );
    let outcome = manager.run_job("shop").await.assert_ok().assert_some();

    assert!(outcome.success, "{:?}", outcome.error);
    let remote = outcome.remote_file.assert_some();
    assert!(remote.ends_with(".sql.xz.enc"));
    assert!(leftover_artifacts(&job).is_empty());
}

#[tokio::test]
async fn test_retention_keeps_newest_backups() {
    let ctx = TestContext::new();
    let mut job = sample_job("prefix", ctx.temp_dir());
    job.prefix = "prefix_".to_string();
    job.date_format = "%Y%m%d".to_string();
    job.max_backup_files = 2;

    // Today's upload is the newest, so two of the three old ones go
    let client = MockTransferClient::new()
        .with_files(&backup_names("prefix_", &["20240101", "20240102", "20240103"]));
    let manager = mocked_remote_manager(
        job,
        ctx.temp_dir(),
        client.clone(),
        Arc::new(MockDumper::new()),
        MockNotifier::new(),
    );
    let outcome = manager.run_job("prefix").await.assert_ok().assert_some();

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.deleted, vec!["prefix_20240101.sql", "prefix_20240102.sql"]);

    let mut remaining = client.remaining_files();
    remaining.sort();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0], "prefix_20240103.sql");
}

#[tokio::test]
async fn test_retention_never_deletes_unparsable_names() {
    let ctx = TestContext::new();
    let mut job = sample_job("prefix", ctx.temp_dir());
    job.prefix = "prefix_".to_string();
    job.date_format = "%Y%m%d".to_string();
    job.max_backup_files = 1;

    let mut existing = backup_names("prefix_", &["20240101", "20240102"]);
    existing.push("prefix_invalid.sql".to_string());
    let client = MockTransferClient::new().with_files(&existing);

    let manager = mocked_remote_manager(
        job,
        ctx.temp_dir(),
        client.clone(),
        Arc::new(MockDumper::new()),
        MockNotifier::new(),
    );
    let outcome = manager.run_job("prefix").await.assert_ok().assert_some();

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.deleted, vec!["prefix_20240101.sql", "prefix_20240102.sql"]);
    assert!(!client
        .get_calls()
        .iter()
        .any(|call| matches!(call, TransferCall::Delete(path) if path.ends_with("prefix_invalid.sql"))));
    assert!(client.remaining_files().contains(&"prefix_invalid.sql".to_string()));
}

#[tokio::test]
async fn test_dump_failure_skips_later_stages() {
    let ctx = TestContext::new();
    let mut job = sample_job("shop", ctx.temp_dir());
    job.compression_enabled = true;
    job.encryption_passphrase = Some(Secret::new("secret"));

    let client = MockTransferClient::new();
    let notifier = MockNotifier::new();
    let dumper = MockDumper::new()
        .with_failure("Lost connection to MySQL server during query")
        .with_partial_write();

    let manager = mocked_remote_manager(
        job.clone(),
        ctx.temp_dir(),
        client.clone(),
        Arc::new(dumper),
        notifier.clone(),
    );
    let outcome = manager.run_job("shop").await.assert_ok().assert_some();

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Dump));
    assert_eq!(outcome.failed_stage, Some(JobStage::Dumping));
    assert!(outcome.visited(JobStage::Failed));
    assert!(!outcome.visited(JobStage::Compressing));
    assert!(!outcome.visited(JobStage::Encrypting));
    assert!(!outcome.visited(JobStage::Uploading));
    assert!(!outcome.visited(JobStage::Pruning));
    assert!(client.get_calls().is_empty());

    let report = notifier.last_report().assert_some();
    assert!(!report.success);
    assert!(report.error.assert_some().contains("Lost connection"));

    assert!(leftover_artifacts(&job).is_empty());
}

#[tokio::test]
async fn test_upload_failure_cleans_up_and_disconnects() {
    let ctx = TestContext::new();
    let mut job = sample_job("shop", ctx.temp_dir());
    job.compression_enabled = true;

    let client = MockTransferClient::new().with_failure("upload", "No space left on device");
    let notifier = MockNotifier::new();
    let manager = mocked_remote_manager(
        job.clone(),
        ctx.temp_dir(),
        client.clone(),
        Arc::new(MockDumper::new()),
        notifier.clone(),
    );
    let outcome = manager.run_job("shop").await.assert_ok().assert_some();

    assert_eq!(outcome.error_kind(), Some(ErrorKind::Transfer));
    assert!(!outcome.visited(JobStage::Pruning));
    assert_eq!(client.get_calls().last(), Some(&TransferCall::Disconnect));
    assert!(leftover_artifacts(&job).is_empty());
    assert_eq!(notifier.get_reports().len(), 1);
}

#[tokio::test]
async fn test_secrets_stay_out_of_reports() {
    let ctx = TestContext::new();
    let mut job = sample_job("shop", ctx.temp_dir());
    job.encryption_passphrase = Some(Secret::new("enc-passphrase-xyz"));

    let notifier = MockNotifier::new();
    let client = MockTransferClient::new().with_failure("connect", "authentication rejected");
    let manager = mocked_remote_manager(
        job,
        ctx.temp_dir(),
        client,
        Arc::new(MockDumper::new()),
        notifier.clone(),
    );
    let outcome = manager.run_job("shop").await.assert_ok().assert_some();

    let report = notifier.last_report().assert_some();
    let rendered = format!("{:?} {}", report, report.details());
    assert!(!outcome.success);
    assert!(!rendered.contains("enc-passphrase-xyz"));
    assert!(!rendered.contains("db-password-123"));
}
