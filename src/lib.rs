//! Dump Manager Library
//!
//! Scheduled MySQL dumps: compress, encrypt, ship to a local directory or a
//! remote host (SCP, SFTP, FTP), prune old backups and report the outcome.

pub mod config;
pub mod error;
pub mod managers;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, resolve_all_jobs, Config, ResolvedJobDescriptor};
pub use error::{BackupError, ErrorKind};
pub use managers::backup::{BackupManager, JobOutcome, JobStage, RunSummary};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::notification::{BackupReport, NotificationDispatcher};
pub use transfer::{TransferClient, TransferFactory};
