//! Transfer clients: move a backup artifact to its destination
//!
//! One [`TransferClient`] contract with four implementations:
//!
//! | Variant | Transport | Directory handling |
//! |---------|-----------|--------------------|
//! | [`LocalClient`] | filesystem copy | recursive create |
//! | [`ScpClient`] | SSH exec (`scp -t`, `mkdir -p`, `rm`, `ls -1`) | `mkdir -p` |
//! | [`SftpClient`] | SSH SFTP subsystem | stat/create per component |
//! | [`FtpClient`] | FTP control + data connection | cwd/mkd per component |
//!
//! A client is opened once per job, used for upload and pruning, and always
//! disconnected. `disconnect` is safe to call at any point, including after a
//! failed or skipped `connect`.

mod ftp;
mod local;
pub mod mock;
mod scp;
mod sftp;
mod ssh;

pub use ftp::{FtpClient, FtpConnector, FtpOpError, FtpSession};
pub use local::LocalClient;
pub use scp::ScpClient;
pub use sftp::SftpClient;

use crate::config::{Destination, Protocol, Timeouts};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// Capability set shared by every transfer protocol
///
/// Remote paths are `/`-separated strings. Relative paths resolve against
/// the directory set by [`TransferClient::chdir`] (or the login directory).
#[async_trait]
pub trait TransferClient: Send {
    /// Open the underlying connection; fails with a connect error on network or auth failure
    async fn connect(&mut self) -> Result<()>;

    /// Close the connection; idempotent and never fails
    async fn disconnect(&mut self);

    /// Create `path` and any missing parents; existing directories are not an error
    async fn mkdir(&mut self, path: &str) -> Result<()>;

    /// Change the working directory used to resolve relative paths
    async fn chdir(&mut self, path: &str) -> Result<()>;

    /// Copy a local file to `remote_path`, creating the parent directory first
    async fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<()>;

    async fn delete_file(&mut self, path: &str) -> Result<()>;

    /// Names (not paths) of the entries in directory `path`, in no particular order
    async fn list_files(&mut self, path: &str) -> Result<Vec<String>>;
}

/// Builds the client for a destination, enabling mocking in tests
pub trait TransferFactory: Send + Sync {
    fn create(&self, destination: &Destination, timeouts: &Timeouts) -> Box<dyn TransferClient>;
}

/// Default factory selecting the client by protocol
#[derive(Debug, Clone, Default)]
pub struct RealTransferFactory;

impl TransferFactory for RealTransferFactory {
    fn create(&self, destination: &Destination, timeouts: &Timeouts) -> Box<dyn TransferClient> {
        match destination {
            Destination::Local { .. } => Box::new(LocalClient::new(timeouts.transfer)),
            Destination::Remote { host, .. } => match host.protocol {
                Protocol::Scp => Box::new(ScpClient::new(host.clone(), *timeouts)),
                Protocol::Sftp => Box::new(SftpClient::new(host.clone(), *timeouts)),
                Protocol::Ftp => Box::new(FtpClient::new(host.clone(), *timeouts)),
            },
        }
    }
}

/// Directory a destination writes into, as a transfer path
pub fn destination_dir(destination: &Destination) -> String {
    match destination {
        Destination::Local { path } => path.to_string_lossy().into_owned(),
        Destination::Remote { path, .. } => path.clone(),
    }
}

/// Join a remote directory and a file name with exactly one `/`
pub fn join_remote(dir: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Split a remote path into (parent directory, file name)
///
/// `"/a/b/file"` gives `("/a/b", "file")`, `"/file"` gives `("/", "file")`
/// and a bare `"file"` gives `("", "file")`.
pub fn split_remote(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    }
}

/// Resolve `path` against a working directory
pub fn resolve_remote(cwd: Option<&str>, path: &str) -> String {
    match cwd {
        Some(cwd) if !path.starts_with('/') => join_remote(cwd, path),
        _ => path.to_string(),
    }
}

/// Cumulative prefixes of a remote directory path
///
/// `"/a/b/c"` gives `["/a", "/a/b", "/a/b/c"]`; relative paths stay relative.
pub fn path_prefixes(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    let mut prefixes = Vec::new();

    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if absolute || !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        prefixes.push(current.clone());
    }

    prefixes
}

/// Quote one argument for a POSIX shell
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Bound a transfer operation by `limit`
pub(crate) async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BackupError::Timeout {
            operation: operation.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}
