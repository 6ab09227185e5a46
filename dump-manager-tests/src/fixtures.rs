//! Test fixtures and sample data
//!
//! Provides pre-built jobs, listings and config templates for testing.

use dump_manager::config::{DbConnection, Destination, ResolvedJobDescriptor, Secret, Timeouts};
use std::path::Path;

/// Dump content used by pipeline tests
pub const SAMPLE_DUMP: &[u8] = b"-- MySQL dump\nCREATE TABLE orders (id INT);\nINSERT INTO orders VALUES (1),(2),(3);\n";

/// Database connection that is never actually reached
fn sample_connection() -> DbConnection {
    DbConnection {
        host: "db.internal".to_string(),
        port: 3306,
        username: "backup".to_string(),
        password: Secret::new("db-password-123"),
        database: "shop".to_string(),
    }
}

/// Resolved job writing into `root/dest` with artifacts under `root/work`
///
/// Compression, encryption and notifications are off; tests switch them on.
pub fn sample_job(id: &str, root: &Path) -> ResolvedJobDescriptor {
    ResolvedJobDescriptor {
        id: id.to_string(),
        enabled: true,
        description: format!("Sample job: {}", id),
        schedule: "0 2 * * *".to_string(),
        database: sample_connection(),
        skip_tables: vec![],
        destination: Destination::Local {
            path: root.join("dest"),
        },
        prefix: format!("{}_", id),
        date_format: "%Y%m%d_%H%M%S".to_string(),
        compression_enabled: false,
        encryption_passphrase: None,
        max_backup_files: 10,
        notifications: vec![],
        timeouts: Timeouts::default(),
        work_directory: root.join("work"),
    }
}

/// Backup names `<prefix><date>.sql` for each `YYYYMMDD` date
pub fn backup_names(prefix: &str, dates: &[&str]) -> Vec<String> {
    dates
        .iter()
        .map(|date| format!("{}{}.sql", prefix, date))
        .collect()
}

/// Every file below `dir`, relative names, sorted
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Minimal valid config TOML template
pub fn minimal_config_toml() -> &'static str {
    r#"
[global]
work_directory = "{work_dir}"
lock_directory = "{lock_dir}"
log_directory = "{log_dir}"

[db_connections.main]
host = "127.0.0.1"
port = 1
username = "backup"
password = "db-password-123"
database = "shop"

[backups.shop]
db_connection = "main"
local = true
path = "{backup_path}"
"#
}

/// Config with one backup per remote protocol
pub fn multi_protocol_config_toml() -> &'static str {
    r#"
[global]
work_directory = "{work_dir}"
lock_directory = "{lock_dir}"
log_directory = "{log_dir}"
max_backup_files = 7

[db_connections.main]
host = "db.internal"
username = "backup"
password = "db-password-123"
database = "shop"

[hosts.scp-box]
host = "scp.example.com"
username = "deploy"
ssh_key = "~/.ssh/id_ed25519"
protocol = "scp"

[hosts.sftp-box]
host = "sftp.example.com"
port = 2222
username = "deploy"
password = "host-password-123"
protocol = "sftp"

[hosts.ftp-box]
host = "ftp.example.com"
username = "deploy"
password = "host-password-123"
protocol = "ftp"

[backups.via-scp]
db_connection = "main"
host = "scp-box"
path = "/srv/backups"

[backups.via-sftp]
db_connection = "main"
host = "sftp-box"
path = "backups"
compression_enabled = false

[backups.via-ftp]
db_connection = "main"
host = "ftp-box"
path = "/backups/shop"
max_backup_files = 3
"#
}

/// Config with encryption and a Discord target
pub fn encrypted_config_toml() -> &'static str {
    r#"
[global]
work_directory = "{work_dir}"
lock_directory = "{lock_dir}"
log_directory = "{log_dir}"
encryption_enabled = true
encryption_password = "passphrase-123"
notifications = ["ops"]

[db_connections.main]
host = "127.0.0.1"
port = 1
username = "backup"
password = "db-password-123"
database = "shop"

[notifications.ops]
method = "discord"
webhook_url = "https://discord.invalid/api/webhooks/1/token"
notify_on_success = true

[backups.shop]
db_connection = "main"
local = true
path = "{backup_path}"
"#
}

/// Fill the `{...}` placeholders of a template with directories under `root`
pub fn render_template(template: &str, root: &Path) -> String {
    template
        .replace("{work_dir}", &root.join("work").display().to_string())
        .replace("{lock_dir}", &root.join("locks").display().to_string())
        .replace("{log_dir}", &root.join("logs").display().to_string())
        .replace("{backup_path}", &root.join("backups").display().to_string())
}
