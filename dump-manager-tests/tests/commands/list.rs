//! Tests for the 'list' command
//!
//! The list command prints every configured backup, enabled or not.

use dump_manager::config::resolve_all_jobs;
use dump_manager::BackupManager;
use test_utils::{ConfigBuilder, OptionAssertions};

#[test]
fn test_list_is_sorted_and_includes_disabled() {
    let config = ConfigBuilder::minimal()
        .add_backup("zeta")
        .add_disabled_backup("alpha")
        .add_backup("mid")
        .build();
    let jobs = resolve_all_jobs(&config).unwrap();

    let manager = BackupManager::new(jobs, &config.global.lock_directory);

    assert_eq!(manager.job_ids(), vec!["alpha", "mid", "zeta"]);
    assert!(!manager.get_job("alpha").assert_some().enabled);
    manager.get_job("unknown").assert_none();
}

#[test]
fn test_list_shows_resolved_settings() {
    let config = ConfigBuilder::minimal()
        .with_encryption("passphrase-123")
        .with_compression(false)
        .with_max_backup_files(4)
        .add_backup("shop")
        .build();
    let jobs = resolve_all_jobs(&config).unwrap();
    let job = &jobs["shop"];

    assert_eq!(job.host_name(), "localhost");
    assert_eq!(job.protocol_name(), "local");
    assert!(job.encryption_enabled());
    assert!(!job.compression_enabled);
    assert_eq!(job.max_backup_files, 4);
    assert_eq!(job.database.database, "shop");
}
