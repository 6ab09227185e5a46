//! MySQL integration tests
//!
//! These tests start a MySQL container and run a real `mysqldump` against it.
//! Run with: `cargo test -p dump-manager-tests --test integration -- --ignored`

use super::common::local_manager;
use anyhow::Result;
use dump_manager::config::{DbConnection, Secret};
use dump_manager::utils::compression::decompress_file;
use dump_manager::utils::MysqlDumper;
use std::process::Command;
use std::sync::Arc;
use testcontainers::clients::Cli;
use testcontainers_modules::mysql::Mysql;
use test_utils::{files_in, sample_job, MockNotifier, OptionAssertions, ResultAssertions, TestContext};

/// Helper to check if a mysqldump client is installed on the host
fn is_mysqldump_available() -> bool {
    Command::new("mysqldump")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Helper to execute SQL inside the container
fn exec_sql(container_id: &str, sql: &str) -> Result<String> {
    let output = Command::new("docker")
        .args(["exec", container_id, "mysql", "-uroot", "test", "-e", sql])
        .output()?;

    if !output.status.success() {
        anyhow::bail!("SQL failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Helper to create test data
fn create_test_data(container_id: &str) -> Result<()> {
    exec_sql(container_id, "CREATE TABLE orders (id INT PRIMARY KEY, item VARCHAR(64))")?;
    exec_sql(container_id, "INSERT INTO orders VALUES (1, 'keyboard'), (2, 'monitor')")?;
    exec_sql(container_id, "CREATE TABLE audit_log (id INT PRIMARY KEY, entry TEXT)")?;
    exec_sql(container_id, "INSERT INTO audit_log VALUES (1, 'noisy')")?;
    Ok(())
}

fn connection(port: u16) -> DbConnection {
    DbConnection {
        host: "127.0.0.1".to_string(),
        port,
        username: "root".to_string(),
        password: Secret::new(""),
        database: "test".to_string(),
    }
}

#[tokio::test]
#[ignore]
async fn test_mysql_dump_compress_and_ship() {
    if !is_mysqldump_available() {
        eprintln!("Skipping test: mysqldump not installed");
        return;
    }

    let docker = Cli::default();
    let node = docker.run(Mysql::default());
    let port = node.get_host_port_ipv4(3306);
    create_test_data(node.id()).assert_ok_msg("Failed to seed MySQL");

    let ctx = TestContext::new();
    let mut job = sample_job("shop", ctx.temp_dir());
    job.database = connection(port);
    job.compression_enabled = true;
    job.skip_tables = vec!["audit_log".to_string()];

    let manager = local_manager(
        job,
        ctx.temp_dir(),
        Arc::new(MysqlDumper::new()),
        MockNotifier::new(),
    );
    let outcome = manager.run_job("shop").await.assert_ok().assert_some();
    assert!(outcome.success, "{:?}", outcome.error);

    let dest = ctx.temp_dir().join("dest");
    let files = files_in(&dest);
    assert_eq!(files.len(), 1);

    let dump = decompress_file(&dest.join(&files[0])).assert_ok();
    let sql = std::fs::read_to_string(dump).unwrap();
    assert!(sql.contains("CREATE TABLE `orders`"));
    assert!(sql.contains("keyboard"));
    assert!(!sql.contains("audit_log"), "skipped table must not be dumped");
}

#[tokio::test]
#[ignore]
async fn test_mysql_wrong_database_fails_without_leaking_password() {
    if !is_mysqldump_available() {
        eprintln!("Skipping test: mysqldump not installed");
        return;
    }

    let docker = Cli::default();
    let node = docker.run(Mysql::default());
    let port = node.get_host_port_ipv4(3306);

    let ctx = TestContext::new();
    let mut job = sample_job("shop", ctx.temp_dir());
    job.database = DbConnection {
        username: "nobody".to_string(),
        password: Secret::new("wrong-password-456"),
        ..connection(port)
    };

    let notifier = MockNotifier::new();
    let manager = local_manager(job, ctx.temp_dir(), Arc::new(MysqlDumper::new()), notifier.clone());
    let outcome = manager.run_job("shop").await.assert_ok().assert_some();

    assert!(!outcome.success);
    let report = notifier.last_report().assert_some();
    let error = report.error.assert_some();
    assert!(!error.contains("wrong-password-456"));
    assert!(files_in(&ctx.temp_dir().join("dest")).is_empty());
}
