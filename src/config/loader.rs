use super::expand_tilde;
use super::Secret;
use super::types::*;
use crate::utils::retention::parse_backup_timestamp;
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Backup '{0}' not found")]
    BackupNotFound(String),

    #[error("Database connection '{0}' not found")]
    DbConnectionNotFound(String),

    #[error("Host '{0}' not found")]
    HostNotFound(String),

    #[error("Notification '{0}' not found")]
    NotificationNotFound(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.backups.is_empty() {
        return Err(ConfigError::ValidationError(
            "No backups defined".to_string(),
        ));
    }

    if !is_valid_date_format(&config.global.date_format) {
        return Err(ConfigError::ValidationError(format!(
            "Invalid global date_format: {}",
            config.global.date_format
        )));
    }

    for name in &config.global.notifications {
        if !config.notifications.contains_key(name) {
            return Err(ConfigError::NotificationNotFound(name.clone()));
        }
    }

    for (name, host) in &config.hosts {
        validate_host(name, host)?;
    }

    for (name, target) in &config.notifications {
        validate_notification(name, target)?;
    }

    for (id, backup) in &config.backups {
        validate_backup(id, backup, config)?;
    }

    Ok(())
}

fn validate_host(name: &str, host: &HostConfig) -> Result<()> {
    if host.host.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Host '{}': hostname is empty",
            name
        )));
    }

    match (&host.password, &host.ssh_key) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::ValidationError(format!(
                "Host '{}': set either password or ssh_key, not both",
                name
            )));
        }
        (None, None) => {
            return Err(ConfigError::ValidationError(format!(
                "Host '{}': a password or ssh_key is required",
                name
            )));
        }
        _ => {}
    }

    if host.protocol == Protocol::Ftp && host.password.is_none() {
        return Err(ConfigError::ValidationError(format!(
            "Host '{}': ftp requires password authentication",
            name
        )));
    }

    Ok(())
}

fn validate_notification(name: &str, target: &NotificationTarget) -> Result<()> {
    match target.method {
        NotificationMethod::Discord => {
            if target.webhook_url.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::ValidationError(format!(
                    "Notification '{}': discord requires webhook_url",
                    name
                )));
            }
        }
        NotificationMethod::Email => {
            if target.smtp_server.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::ValidationError(format!(
                    "Notification '{}': email requires smtp_server",
                    name
                )));
            }
            if target.sender.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::ValidationError(format!(
                    "Notification '{}': email requires sender",
                    name
                )));
            }
            if target.recipients.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Notification '{}': email requires at least one recipient",
                    name
                )));
            }
        }
    }

    Ok(())
}

fn validate_backup(id: &str, backup: &BackupConfig, config: &Config) -> Result<()> {
    if !config.db_connections.contains_key(&backup.db_connection) {
        return Err(ConfigError::DbConnectionNotFound(backup.db_connection.clone()));
    }

    match (backup.local, &backup.host) {
        (true, Some(_)) => {
            return Err(ConfigError::ValidationError(format!(
                "Backup '{}': set either local = true or host, not both",
                id
            )));
        }
        (false, None) => {
            return Err(ConfigError::ValidationError(format!(
                "Backup '{}': host must be specified unless local = true",
                id
            )));
        }
        (false, Some(host)) => {
            if !config.hosts.contains_key(host) {
                return Err(ConfigError::HostNotFound(host.clone()));
            }
        }
        (true, None) => {}
    }

    if backup.path.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Backup '{}': path is empty",
            id
        )));
    }

    if let Some(ref names) = backup.notifications {
        for name in names {
            if !config.notifications.contains_key(name) {
                return Err(ConfigError::NotificationNotFound(name.clone()));
            }
        }
    }

    let schedule = backup.schedule.as_ref().unwrap_or(&config.global.schedule);
    if schedule.split_whitespace().count() != 5 {
        return Err(ConfigError::ValidationError(format!(
            "Backup '{}': invalid cron schedule format (expected 5 fields): {}",
            id, schedule
        )));
    }

    if let Some(ref format) = backup.date_format {
        if !is_valid_date_format(format) {
            return Err(ConfigError::ValidationError(format!(
                "Backup '{}': invalid date_format: {}",
                id, format
            )));
        }
    }

    if let Some(ref prefix) = backup.prefix {
        if prefix.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "Backup '{}': prefix must not contain '/'",
                id
            )));
        }
    }

    let encryption_enabled = backup
        .encryption_enabled
        .unwrap_or(config.global.encryption_enabled);
    if encryption_enabled && effective_passphrase(backup, &config.global).is_none() {
        return Err(ConfigError::ValidationError(format!(
            "Backup '{}': encryption is enabled but no encryption_password is set",
            id
        )));
    }

    Ok(())
}

/// A strftime pattern chrono can both format and parse
///
/// The pattern must render a sample timestamp into a single path segment and
/// parse back to that timestamp the way retention reads backup names.
pub fn is_valid_date_format(format: &str) -> bool {
    if format.trim().is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return false;
    }

    let Some(sample) = NaiveDate::from_ymd_opt(2024, 3, 15).and_then(|d| d.and_hms_opt(13, 45, 30)) else {
        return false;
    };

    // Zone specifiers cannot be rendered from a naive timestamp
    let mut rendered = String::new();
    if write!(rendered, "{}", sample.format(format)).is_err() {
        return false;
    }
    if rendered.is_empty() || rendered.contains('/') || rendered.contains('\\') {
        return false;
    }

    // Formats without a date or with truncated fields would never round-trip
    let name = format!("{}.sql", rendered);
    match parse_backup_timestamp(&name, "", format) {
        Some(parsed) => parsed.date() == sample.date(),
        None => false,
    }
}

fn effective_passphrase<'a>(backup: &'a BackupConfig, global: &'a GlobalConfig) -> Option<&'a Secret> {
    backup
        .encryption_password
        .as_ref()
        .or(global.encryption_password.as_ref())
        .filter(|secret| !secret.is_empty())
}

fn resolve_host(name: &str, host: &HostConfig) -> Result<RemoteHost> {
    let credential = match (&host.password, &host.ssh_key) {
        (Some(password), None) => Credential::Password(password.clone()),
        (None, Some(key)) => Credential::Key(expand_tilde(key)),
        _ => {
            return Err(ConfigError::ValidationError(format!(
                "Host '{}': exactly one of password or ssh_key is required",
                name
            )));
        }
    };

    Ok(RemoteHost {
        name: name.to_string(),
        hostname: host.host.clone(),
        port: host.port.unwrap_or_else(|| host.protocol.default_port()),
        username: host.username.clone(),
        credential,
        protocol: host.protocol,
    })
}

/// Resolve a backup by merging it with global defaults and dereferencing names
pub fn resolve_job(id: &str, backup: &BackupConfig, config: &Config) -> Result<ResolvedJobDescriptor> {
    let global = &config.global;

    let database = config
        .db_connections
        .get(&backup.db_connection)
        .cloned()
        .ok_or_else(|| ConfigError::DbConnectionNotFound(backup.db_connection.clone()))?;

    let destination = match (&backup.host, backup.local) {
        (None, true) => Destination::Local {
            path: expand_tilde(Path::new(&backup.path)),
        },
        (Some(host_name), false) => {
            let host = config
                .hosts
                .get(host_name)
                .ok_or_else(|| ConfigError::HostNotFound(host_name.clone()))?;
            Destination::Remote {
                host: resolve_host(host_name, host)?,
                path: backup.path.clone(),
            }
        }
        _ => {
            return Err(ConfigError::ValidationError(format!(
                "Backup '{}': exactly one of local = true or host is required",
                id
            )));
        }
    };

    // Encryption (backup > global)
    let encryption_enabled = backup.encryption_enabled.unwrap_or(global.encryption_enabled);
    let encryption_passphrase = if encryption_enabled {
        let secret = effective_passphrase(backup, global).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "Backup '{}': encryption is enabled but no encryption_password is set",
                id
            ))
        })?;
        Some(secret.clone())
    } else {
        None
    };

    // Notifications (backup > global)
    let notification_names = backup
        .notifications
        .as_ref()
        .unwrap_or(&global.notifications);
    let notifications = notification_names
        .iter()
        .map(|name| {
            config
                .notifications
                .get(name)
                .map(|target| ResolvedNotification {
                    name: name.clone(),
                    target: target.clone(),
                })
                .ok_or_else(|| ConfigError::NotificationNotFound(name.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ResolvedJobDescriptor {
        id: id.to_string(),
        enabled: backup.enabled,
        description: backup.description.clone(),
        schedule: backup.schedule.clone().unwrap_or_else(|| global.schedule.clone()),
        database,
        skip_tables: backup
            .skip_tables
            .clone()
            .unwrap_or_else(|| global.skip_tables.clone()),
        destination,
        prefix: backup.prefix.clone().unwrap_or_else(|| format!("{}_", id)),
        date_format: backup
            .date_format
            .clone()
            .unwrap_or_else(|| global.date_format.clone()),
        compression_enabled: backup.compression_enabled.unwrap_or(global.compression_enabled),
        encryption_passphrase,
        max_backup_files: backup.max_backup_files.unwrap_or(global.max_backup_files),
        notifications,
        timeouts: Timeouts {
            connect: Duration::from_secs(global.connect_timeout_seconds),
            transfer: Duration::from_secs(global.transfer_timeout_seconds),
            dump: Duration::from_secs(global.dump_timeout_seconds),
        },
        work_directory: expand_tilde(&global.work_directory),
    })
}

/// Resolve a single backup by id
pub fn resolve_job_by_id(id: &str, config: &Config) -> Result<ResolvedJobDescriptor> {
    let backup = config
        .backups
        .get(id)
        .ok_or_else(|| ConfigError::BackupNotFound(id.to_string()))?;
    resolve_job(id, backup, config)
}

/// Resolve all backups in the configuration
pub fn resolve_all_jobs(config: &Config) -> Result<HashMap<String, ResolvedJobDescriptor>> {
    let mut resolved = HashMap::new();

    for (id, backup) in &config.backups {
        let job = resolve_job(id, backup, config)?;
        resolved.insert(id.clone(), job);
    }

    Ok(resolved)
}

/// Settings that are valid but probably not what the operator wants
pub fn collect_warnings(jobs: &HashMap<String, ResolvedJobDescriptor>) -> Vec<String> {
    let mut warnings = Vec::new();

    let mut ids: Vec<_> = jobs.keys().collect();
    ids.sort();

    for id in ids {
        let job = &jobs[id];
        if job.max_backup_files == 0 {
            warnings.push(format!(
                "Backup '{}': max_backup_files = 0 deletes every backup after upload, including the new one",
                id
            ));
        }
        if job.notifications.is_empty() {
            warnings.push(format!("Backup '{}': no notification targets", id));
        }
    }

    warnings
}
