//! Tests for the 'validate' command
//!
//! The validate command loads, checks and resolves the configuration file.

use dump_manager::config::{
    collect_warnings, load_config, resolve_all_jobs, HostConfig, Protocol, Secret,
};
use test_utils::{ConfigBuilder, ResultAssertions, TestContext};

#[test]
fn test_validate_valid_config() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().add_backup("shop"));
    let path = ctx.write_config();

    let loaded = load_config(&path).assert_ok_msg("Valid config should pass validation");
    assert_eq!(loaded.backups.len(), 1);
    assert_eq!(loaded.db_connections.len(), 1);
}

#[test]
fn test_validate_every_protocol() {
    let builder = ConfigBuilder::minimal()
        .add_host("scp-box", Protocol::Scp)
        .add_host("sftp-box", Protocol::Sftp)
        .add_host("ftp-box", Protocol::Ftp)
        .add_remote_backup("a", "scp-box", "/srv/a")
        .add_remote_backup("b", "sftp-box", "/srv/b")
        .add_remote_backup("c", "ftp-box", "/srv/c");
    let ctx = TestContext::from_builder(builder);
    let path = ctx.write_config();

    let loaded = load_config(&path).assert_ok();
    let jobs = resolve_all_jobs(&loaded).assert_ok();
    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs["c"].protocol_name(), "ftp");
}

#[test]
fn test_validate_rejects_encryption_without_password() {
    let builder = ConfigBuilder::minimal();
    let mut backup = builder.local_backup();
    backup.encryption_enabled = Some(true);
    let ctx = TestContext::from_builder(builder.add_backup_config("shop", backup));
    let path = ctx.write_config();

    load_config(&path).assert_err_contains("encryption_password");
}

#[test]
fn test_validate_rejects_bad_schedule() {
    let builder = ConfigBuilder::minimal();
    let mut backup = builder.local_backup();
    backup.schedule = Some("every night".to_string());
    let ctx = TestContext::from_builder(builder.add_backup_config("shop", backup));
    let path = ctx.write_config();

    load_config(&path).assert_err_contains("cron schedule");
}

#[test]
fn test_validate_rejects_prefix_with_slash() {
    let builder = ConfigBuilder::minimal();
    let mut backup = builder.local_backup();
    backup.prefix = Some("../escape_".to_string());
    let ctx = TestContext::from_builder(builder.add_backup_config("shop", backup));
    let path = ctx.write_config();

    load_config(&path).assert_err_contains("prefix");
}

#[test]
fn test_validate_rejects_date_format_with_slash() {
    for format in ["%D", "%Y/%m/%d"] {
        let ctx = TestContext::from_builder(
            ConfigBuilder::minimal()
                .add_backup("shop")
                .with_date_format(format),
        );
        let path = ctx.write_config();

        load_config(&path).assert_err_contains("date_format");
    }
}

#[test]
fn test_validate_rejects_date_format_without_date() {
    let builder = ConfigBuilder::minimal();
    let mut backup = builder.local_backup();
    backup.date_format = Some("%H%M%S".to_string());
    let ctx = TestContext::from_builder(builder.add_backup_config("shop", backup));
    let path = ctx.write_config();

    load_config(&path).assert_err_contains("date_format");
}

#[test]
fn test_validate_accepts_date_only_format() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .add_backup("shop")
            .with_date_format("%Y-%m-%d"),
    );
    let path = ctx.write_config();

    let config = load_config(&path).assert_ok();
    let jobs = resolve_all_jobs(&config).assert_ok();
    assert_eq!(jobs["shop"].date_format, "%Y-%m-%d");
}

#[test]
fn test_validate_rejects_ftp_host_with_key_only() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .add_host_config(
                "legacy-ftp",
                HostConfig {
                    host: "ftp.example.com".to_string(),
                    port: None,
                    username: "deploy".to_string(),
                    password: None,
                    ssh_key: Some("~/.ssh/id_ed25519".into()),
                    protocol: Protocol::Ftp,
                },
            )
            .add_remote_backup("shop", "legacy-ftp", "/backups"),
    );
    let path = ctx.write_config();

    load_config(&path).assert_err_contains("legacy-ftp");
}

#[test]
fn test_validate_rejects_host_with_both_credentials() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .add_host_config(
                "storage",
                HostConfig {
                    host: "sftp.example.com".to_string(),
                    port: Some(2222),
                    username: "deploy".to_string(),
                    password: Some(Secret::new("host-password-123")),
                    ssh_key: Some("~/.ssh/id_ed25519".into()),
                    protocol: Protocol::Sftp,
                },
            )
            .add_remote_backup("shop", "storage", "/backups"),
    );
    let path = ctx.write_config();

    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("storage"));
    assert!(!err.to_string().contains("host-password-123"));
}

#[test]
fn test_validate_no_warnings_with_notifications() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .add_discord_notification("ops", "https://discord.invalid/api/webhooks/1/t")
            .add_backup("shop"),
    );
    let path = ctx.write_config();

    let jobs = resolve_all_jobs(&load_config(&path).unwrap()).unwrap();
    assert!(collect_warnings(&jobs).is_empty());
}

#[test]
fn test_validate_nonexistent_file() {
    load_config("/nonexistent/config.toml").assert_err();
}
