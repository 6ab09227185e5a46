//! Database dump producer
//!
//! Runs `mysqldump` with credentials passed through a private option file so
//! the password never appears on a command line or in logs.

use super::command::{run_command, CommandError};
use crate::config::DbConnection;
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Abstraction over the dump step, enabling mocking in tests
#[async_trait]
pub trait DumpOperations: Send + Sync {
    /// Dump `database` into `destination`, skipping the listed tables
    async fn dump(
        &self,
        database: &DbConnection,
        skip_tables: &[String],
        destination: &Path,
        timeout: Duration,
    ) -> Result<()>;
}

/// Default implementation running `mysqldump`
#[derive(Debug, Clone, Default)]
pub struct MysqlDumper {
    binary: Option<PathBuf>,
}

impl MysqlDumper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific mysqldump binary instead of searching PATH
    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(path.into()),
        }
    }

    fn binary(&self) -> Result<PathBuf> {
        match &self.binary {
            Some(path) => Ok(path.clone()),
            None => which::which("mysqldump")
                .map_err(|_| BackupError::Dump("mysqldump not found in PATH".to_string())),
        }
    }
}

/// Quote a value for a MySQL option file
fn option_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Write the `[client]` option file holding the connection credentials
///
/// The file is created with owner-only permissions and removed when dropped.
fn write_client_options(database: &DbConnection) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("dump-manager-")
        .suffix(".cnf")
        .tempfile()
        .map_err(|e| BackupError::Dump(format!("cannot create option file: {}", e)))?;

    write!(
        file,
        "[client]\nhost={}\nport={}\nuser={}\npassword={}\n",
        option_value(&database.host),
        database.port,
        option_value(&database.username),
        option_value(database.password.expose()),
    )
    .and_then(|_| file.flush())
    .map_err(|e| BackupError::Dump(format!("cannot write option file: {}", e)))?;

    Ok(file)
}

/// Build the mysqldump argument list (credentials excluded)
pub fn dump_args(options_file: &Path, database: &DbConnection, skip_tables: &[String]) -> Vec<String> {
    let mut args = vec![
        format!("--defaults-extra-file={}", options_file.display()),
        "--no-tablespaces".to_string(),
    ];

    for table in skip_tables.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        args.push(format!("--ignore-table={}.{}", database.database, table));
    }

    args.push(database.database.clone());
    args
}

#[async_trait]
impl DumpOperations for MysqlDumper {
    async fn dump(
        &self,
        database: &DbConnection,
        skip_tables: &[String],
        destination: &Path,
        timeout: Duration,
    ) -> Result<()> {
        info!(
            "Dumping database '{}' from {}:{}",
            database.database, database.host, database.port
        );

        let binary = self.binary()?;
        let options = write_client_options(database)?;

        let output_file = File::create(destination).map_err(|e| {
            BackupError::Dump(format!("cannot create {}: {}", destination.display(), e))
        })?;

        let mut cmd = Command::new(&binary);
        cmd.args(dump_args(options.path(), database, skip_tables))
            .stdin(Stdio::null())
            .stdout(Stdio::from(output_file))
            .stderr(Stdio::piped());

        let output = run_command(cmd, "mysqldump", timeout)
            .await
            .map_err(|e| match e {
                CommandError::Failed { code, stderr, .. } => BackupError::Dump(format!(
                    "mysqldump exited with code {:?}: {}",
                    code, stderr
                )),
                CommandError::Timeout { seconds, .. } => {
                    BackupError::Dump(format!("mysqldump timed out after {}s", seconds))
                }
                other => BackupError::Dump(other.to_string()),
            })?;

        drop(options);

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!("mysqldump reported: {}", stderr.trim());
        }

        debug!("Database dump saved to: {}", destination.display());
        Ok(())
    }
}

/// Mock dump producer for testing
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Recorded dump invocation
    #[derive(Clone, Debug)]
    pub struct DumpCall {
        pub database: String,
        pub skip_tables: Vec<String>,
        pub destination: PathBuf,
    }

    #[derive(Clone)]
    pub struct MockDumper {
        pub calls: Arc<Mutex<Vec<DumpCall>>>,
        content: Arc<Mutex<Vec<u8>>>,
        /// Error message to fail with; `None` writes `content`
        failure: Arc<Mutex<Option<String>>>,
        /// Write `content` before failing, like a dump interrupted midway
        partial_write: Arc<Mutex<bool>>,
    }

    impl Default for MockDumper {
        fn default() -> Self {
            Self {
                calls: Arc::default(),
                content: Arc::new(Mutex::new(b"-- dump\n".to_vec())),
                failure: Arc::default(),
                partial_write: Arc::default(),
            }
        }
    }

    impl MockDumper {
        pub fn new() -> Self {
            Self::default()
        }

        /// Bytes written to the destination on success
        pub fn with_content(self, content: &[u8]) -> Self {
            *self.content.lock().unwrap() = content.to_vec();
            self
        }

        /// Make every dump fail with `message`
        pub fn with_failure(self, message: &str) -> Self {
            *self.failure.lock().unwrap() = Some(message.to_string());
            self
        }

        /// Leave a partially written file behind when failing
        pub fn with_partial_write(self) -> Self {
            *self.partial_write.lock().unwrap() = true;
            self
        }

        pub fn get_calls(&self) -> Vec<DumpCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DumpOperations for MockDumper {
        async fn dump(
            &self,
            database: &DbConnection,
            skip_tables: &[String],
            destination: &Path,
            _timeout: Duration,
        ) -> Result<()> {
            self.calls.lock().unwrap().push(DumpCall {
                database: database.database.clone(),
                skip_tables: skip_tables.to_vec(),
                destination: destination.to_path_buf(),
            });

            let content = self.content.lock().unwrap().clone();
            let failure = self.failure.lock().unwrap().clone();

            match failure {
                Some(message) => {
                    if *self.partial_write.lock().unwrap() {
                        std::fs::write(destination, &content)?;
                    }
                    Err(BackupError::Dump(message))
                }
                None => {
                    std::fs::write(destination, &content)?;
                    Ok(())
                }
            }
        }
    }
}
