//! Fluent API for building test configurations
//!
//! Provides a builder pattern for creating test configurations with sensible defaults.
//! Every directory the configuration points at lives inside the builder's temp dir.

use dump_manager::config::{
    BackupConfig, Config, DbConnection, GlobalConfig, HostConfig, NotificationMethod,
    NotificationTarget, Protocol, Secret,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Name of the database connection every builder starts with
pub const DEFAULT_DB: &str = "main";

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    global: GlobalConfig,
    db_connections: HashMap<String, DbConnection>,
    hosts: HashMap<String, HostConfig>,
    notifications: HashMap<String, NotificationTarget>,
    backups: HashMap<String, BackupConfig>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with minimal defaults
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let log_directory = temp_dir.path().join("logs");
        fs::create_dir_all(&log_directory).expect("Failed to create log_directory");

        let global = GlobalConfig {
            work_directory: temp_dir.path().join("work"),
            lock_directory: temp_dir.path().join("locks"),
            log_directory,
            log_level: "debug".to_string(),
            log_max_files: 5,
            connect_timeout_seconds: 2,
            transfer_timeout_seconds: 30,
            dump_timeout_seconds: 30,
            ..Default::default()
        };

        // Nothing listens on port 1, so a real dump fails fast
        let mut db_connections = HashMap::new();
        db_connections.insert(
            DEFAULT_DB.to_string(),
            DbConnection {
                host: "127.0.0.1".to_string(),
                port: 1,
                username: "backup".to_string(),
                password: Secret::new("db-password-123"),
                database: "shop".to_string(),
            },
        );

        Self {
            temp_dir,
            global,
            db_connections,
            hosts: HashMap::new(),
            notifications: HashMap::new(),
            backups: HashMap::new(),
        }
    }

    /// Create a minimal config with the local backup directory in place
    pub fn minimal() -> Self {
        let builder = Self::new();
        fs::create_dir_all(builder.backup_path()).expect("Failed to create backup dir");
        builder
    }

    /// Raw backup entry writing into the local backup directory
    pub fn local_backup(&self) -> BackupConfig {
        BackupConfig {
            enabled: true,
            description: String::new(),
            db_connection: DEFAULT_DB.to_string(),
            local: true,
            host: None,
            path: self.backup_path().display().to_string(),
            prefix: None,
            date_format: None,
            schedule: None,
            skip_tables: None,
            compression_enabled: None,
            encryption_enabled: None,
            encryption_password: None,
            max_backup_files: None,
            notifications: None,
        }
    }

    /// Add a simple local backup
    pub fn add_backup(mut self, id: &str) -> Self {
        let mut backup = self.local_backup();
        backup.description = format!("Test backup: {}", id);
        self.backups.insert(id.to_string(), backup);
        self
    }

    /// Add a disabled local backup
    pub fn add_disabled_backup(mut self, id: &str) -> Self {
        let mut backup = self.local_backup();
        backup.enabled = false;
        backup.description = format!("Disabled backup: {}", id);
        self.backups.insert(id.to_string(), backup);
        self
    }

    /// Add a backup shipped to a configured host
    pub fn add_remote_backup(mut self, id: &str, host: &str, path: &str) -> Self {
        let mut backup = self.local_backup();
        backup.local = false;
        backup.host = Some(host.to_string());
        backup.path = path.to_string();
        self.backups.insert(id.to_string(), backup);
        self
    }

    /// Add a backup with full configuration
    pub fn add_backup_config(mut self, id: &str, backup: BackupConfig) -> Self {
        self.backups.insert(id.to_string(), backup);
        self
    }

    /// Add a password-authenticated host
    pub fn add_host(mut self, name: &str, protocol: Protocol) -> Self {
        self.hosts.insert(
            name.to_string(),
            HostConfig {
                host: format!("{}.example.com", name),
                port: None,
                username: "deploy".to_string(),
                password: Some(Secret::new("host-password-123")),
                ssh_key: None,
                protocol,
            },
        );
        self
    }

    /// Add a host with custom settings
    pub fn add_host_config(mut self, name: &str, host: HostConfig) -> Self {
        self.hosts.insert(name.to_string(), host);
        self
    }

    /// Add a Discord notification target and use it globally
    pub fn add_discord_notification(mut self, name: &str, webhook_url: &str) -> Self {
        self.notifications.insert(
            name.to_string(),
            NotificationTarget {
                method: NotificationMethod::Discord,
                notify_on_fail: true,
                notify_on_success: false,
                webhook_url: Some(webhook_url.to_string()),
                smtp_server: None,
                smtp_port: 587,
                smtp_security: Default::default(),
                smtp_user: None,
                smtp_password: None,
                sender: None,
                recipients: vec![],
            },
        );
        self.global.notifications.push(name.to_string());
        self
    }

    /// Enable encryption for every backup
    pub fn with_encryption(mut self, password: &str) -> Self {
        self.global.encryption_enabled = true;
        self.global.encryption_password = Some(Secret::new(password));
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.global.compression_enabled = enabled;
        self
    }

    /// Set the retention limit
    pub fn with_max_backup_files(mut self, max: u32) -> Self {
        self.global.max_backup_files = max;
        self
    }

    /// Set the file name date format
    pub fn with_date_format(mut self, format: &str) -> Self {
        self.global.date_format = format.to_string();
        self
    }

    /// Get the temp directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory local backups are written to
    pub fn backup_path(&self) -> PathBuf {
        self.temp_dir.path().join("backups")
    }

    /// Build the Config
    pub fn build(self) -> Config {
        self.persist().0
    }

    /// Keep the temp directory (don't delete on drop)
    pub fn persist(self) -> (Config, TempDir) {
        let config = Config {
            global: self.global,
            db_connections: self.db_connections,
            hosts: self.hosts,
            notifications: self.notifications,
            backups: self.backups,
        };
        (config, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
