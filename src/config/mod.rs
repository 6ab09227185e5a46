//! Configuration module for dump-manager
//!
//! This module handles loading, validating, and resolving configuration from TOML files.
//!
//! ## Configuration Inheritance
//!
//! Settings are applied in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. `[global]` settings
//! 3. Backup-level settings
//!
//! Resolution is a pure step: every backup becomes one immutable
//! [`ResolvedJobDescriptor`] with database, host and notification names
//! already dereferenced. Jobs never look at the raw [`Config`] again.
//!
//! ## Example Usage
//!
//! ```no_run
//! use dump_manager::config;
//!
//! let config = config::load_config("/etc/dump-manager/config.toml")?;
//! let jobs = config::resolve_all_jobs(&config)?;
//!
//! for (id, job) in jobs {
//!     println!("Backup: {}, protocol: {}", id, job.protocol_name());
//! }
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod secret;
mod types;

pub use loader::{
    collect_warnings, is_valid_date_format, load_config, resolve_all_jobs, resolve_job,
    resolve_job_by_id, validate_config, ConfigError, Result,
};
pub use secret::Secret;
pub use types::*;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dump-manager/config.toml";

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
