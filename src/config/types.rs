use super::secret::Secret;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub db_connections: HashMap<String, DbConnection>,
    #[serde(default)]
    pub hosts: HashMap<String, HostConfig>,
    #[serde(default)]
    pub notifications: HashMap<String, NotificationTarget>,
    #[serde(default)]
    pub backups: HashMap<String, BackupConfig>,
}

/// Global defaults applied to every backup that does not override them
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    #[serde(default = "default_true")]
    pub compression_enabled: bool,
    #[serde(default)]
    pub encryption_enabled: bool,
    #[serde(default)]
    pub encryption_password: Option<Secret>,
    #[serde(default)]
    pub skip_tables: Vec<String>,

    /// Retention: number of backups kept at each destination
    #[serde(default = "default_max_backup_files")]
    pub max_backup_files: u32,

    /// Cron schedule
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// strftime pattern embedded in backup file names
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Notification targets used by backups without their own list
    #[serde(default)]
    pub notifications: Vec<String>,

    /// Timeout settings
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_seconds: u64,
    #[serde(default = "default_dump_timeout")]
    pub dump_timeout_seconds: u64,

    /// Where dump artifacts are written while a job runs
    #[serde(default = "default_work_directory")]
    pub work_directory: PathBuf,
    #[serde(default = "default_lock_directory")]
    pub lock_directory: PathBuf,

    /// Logging configuration
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_max_files")]
    pub log_max_files: u32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            compression_enabled: true,
            encryption_enabled: false,
            encryption_password: None,
            skip_tables: Vec::new(),
            max_backup_files: default_max_backup_files(),
            schedule: default_schedule(),
            date_format: default_date_format(),
            notifications: Vec::new(),
            connect_timeout_seconds: default_connect_timeout(),
            transfer_timeout_seconds: default_transfer_timeout(),
            dump_timeout_seconds: default_dump_timeout(),
            work_directory: default_work_directory(),
            lock_directory: default_lock_directory(),
            log_directory: default_log_directory(),
            log_level: default_log_level(),
            log_max_files: default_log_max_files(),
        }
    }
}

/// MySQL connection used by the dump stage
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DbConnection {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub username: String,
    pub password: Secret,
    pub database: String,
}

/// Remote host a backup can be shipped to
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    #[serde(default)]
    pub password: Option<Secret>,
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[serde(alias = "ssh")]
    Scp,
    Sftp,
    Ftp,
}

impl Protocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Scp | Protocol::Sftp => 22,
            Protocol::Ftp => 21,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Scp => "scp",
            Protocol::Sftp => "sftp",
            Protocol::Ftp => "ftp",
        }
    }
}

/// A named notification target
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationTarget {
    pub method: NotificationMethod,
    #[serde(default = "default_true")]
    pub notify_on_fail: bool,
    #[serde(default)]
    pub notify_on_success: bool,

    /// Discord
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Email
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_security: SmtpSecurity,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<Secret>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMethod {
    Email,
    Discord,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS (usually port 465)
    Tls,
    #[default]
    Starttls,
    /// Plain connection, for local relays only
    None,
}

/// Backup job configuration (raw, before resolution)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub description: String,

    /// Name of an entry in `db_connections`
    pub db_connection: String,

    /// Write backups to a local directory instead of a remote host
    #[serde(default)]
    pub local: bool,
    /// Name of an entry in `hosts`
    #[serde(default)]
    pub host: Option<String>,
    /// Destination directory (local or remote)
    pub path: String,

    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default)]
    pub skip_tables: Option<Vec<String>>,
    #[serde(default)]
    pub compression_enabled: Option<bool>,
    #[serde(default)]
    pub encryption_enabled: Option<bool>,
    #[serde(default)]
    pub encryption_password: Option<Secret>,
    #[serde(default)]
    pub max_backup_files: Option<u32>,

    #[serde(default)]
    pub notifications: Option<Vec<String>>,
}

/// Fully resolved, immutable description of one backup job
#[derive(Debug, Clone)]
pub struct ResolvedJobDescriptor {
    pub id: String,
    pub enabled: bool,
    pub description: String,
    pub schedule: String,
    pub database: DbConnection,
    pub skip_tables: Vec<String>,
    pub destination: Destination,
    pub prefix: String,
    pub date_format: String,
    pub compression_enabled: bool,
    /// Present exactly when encryption is enabled
    pub encryption_passphrase: Option<Secret>,
    pub max_backup_files: u32,
    pub notifications: Vec<ResolvedNotification>,
    pub timeouts: Timeouts,
    pub work_directory: PathBuf,
}

impl ResolvedJobDescriptor {
    pub fn encryption_enabled(&self) -> bool {
        self.encryption_passphrase.is_some()
    }

    /// Protocol label used in logs and reports
    pub fn protocol_name(&self) -> &'static str {
        match &self.destination {
            Destination::Local { .. } => "local",
            Destination::Remote { host, .. } => host.protocol.as_str(),
        }
    }

    /// Host label used in logs and reports
    pub fn host_name(&self) -> String {
        match &self.destination {
            Destination::Local { .. } => "localhost".to_string(),
            Destination::Remote { host, .. } => host.hostname.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Destination {
    Local { path: PathBuf },
    Remote { host: RemoteHost, path: String },
}

#[derive(Debug, Clone)]
pub struct RemoteHost {
    /// Name of the `[hosts.<name>]` entry
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    pub protocol: Protocol,
}

/// Remote authentication: a password or a private key, never both
#[derive(Debug, Clone)]
pub enum Credential {
    Password(Secret),
    Key(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ResolvedNotification {
    pub name: String,
    pub target: NotificationTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub transfer: Duration,
    pub dump: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(default_connect_timeout()),
            transfer: Duration::from_secs(default_transfer_timeout()),
            dump: Duration::from_secs(default_dump_timeout()),
        }
    }
}

// Default value functions

fn default_true() -> bool { true }
fn default_max_backup_files() -> u32 { 100 }
fn default_schedule() -> String { "0 0 * * *".to_string() }
fn default_date_format() -> String { "%Y%m%d_%H%M%S".to_string() }
fn default_connect_timeout() -> u64 { 10 }
fn default_transfer_timeout() -> u64 { 3600 }
fn default_dump_timeout() -> u64 { 3600 }
fn default_work_directory() -> PathBuf { std::env::temp_dir().join("dump-manager") }
fn default_lock_directory() -> PathBuf { std::env::temp_dir() }
fn default_log_directory() -> PathBuf { PathBuf::from("~/logs") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
fn default_db_port() -> u16 { 3306 }
fn default_smtp_port() -> u16 { 587 }
