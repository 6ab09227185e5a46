//! Failure taxonomy shared by every pipeline stage
//!
//! Messages are built from job ids, host names, paths and operation names.
//! Credentials never reach an error string.

use std::fmt;
use thiserror::Error;

/// Coarse classification of a failure, reported in job outcomes and notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Dump,
    Compression,
    Encryption,
    Decryption,
    Connect,
    Transfer,
    Retention,
    Notification,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Dump => "dump",
            ErrorKind::Compression => "compression",
            ErrorKind::Encryption => "encryption",
            ErrorKind::Decryption => "decryption",
            ErrorKind::Connect => "connect",
            ErrorKind::Transfer => "transfer",
            ErrorKind::Retention => "retention",
            ErrorKind::Notification => "notification",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Database dump failed: {0}")]
    Dump(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Wrong passphrase and tampered data are reported identically
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("{operation} failed for '{path}': {reason}")]
    Transfer {
        operation: &'static str,
        path: String,
        reason: String,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Retention failed: {0}")]
    Retention(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::Dump(_) => ErrorKind::Dump,
            BackupError::Compression(_) => ErrorKind::Compression,
            BackupError::Encryption(_) => ErrorKind::Encryption,
            BackupError::Decryption(_) => ErrorKind::Decryption,
            BackupError::Connect { .. } => ErrorKind::Connect,
            BackupError::Transfer { .. } | BackupError::Timeout { .. } => ErrorKind::Transfer,
            BackupError::Retention(_) => ErrorKind::Retention,
            BackupError::Notification(_) => ErrorKind::Notification,
            BackupError::Io(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for a transfer failure on a remote or local path
    pub fn transfer(operation: &'static str, path: impl Into<String>, reason: impl fmt::Display) -> Self {
        BackupError::Transfer {
            operation,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn connect(host: impl Into<String>, reason: impl fmt::Display) -> Self {
        BackupError::Connect {
            host: host.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
