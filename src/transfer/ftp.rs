//! FTP client
//!
//! suppaftp's `FtpStream` is blocking, so every operation runs on the
//! blocking pool with the session moved in and handed back afterwards.
//! The session sits behind [`FtpSession`] so the directory walk can be
//! exercised without a server.

use super::{path_prefixes, resolve_remote, split_remote, TransferClient};
use crate::config::{Credential, RemoteHost, Timeouts};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::Read;
use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};
use tracing::{debug, info};

/// Failure reported by an FTP session, with the server reply code if any
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct FtpOpError {
    pub code: Option<u32>,
    pub message: String,
}

impl FtpOpError {
    pub fn reply(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: format!("{} {}", code, message.into()),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// 5xx: permanent negative completion (no such directory, permission denied)
    pub fn is_permanent(&self) -> bool {
        matches!(self.code, Some(500..=599))
    }
}

impl From<FtpError> for FtpOpError {
    fn from(e: FtpError) -> Self {
        let code = match &e {
            FtpError::UnexpectedResponse(response) => Some(response.status.code()),
            _ => None,
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

/// Commands the client needs from an FTP control connection
pub trait FtpSession: Send {
    fn pwd(&mut self) -> std::result::Result<String, FtpOpError>;
    fn cwd(&mut self, path: &str) -> std::result::Result<(), FtpOpError>;
    fn mkd(&mut self, path: &str) -> std::result::Result<(), FtpOpError>;
    /// Store `reader` as `name` in the current directory
    fn put(&mut self, name: &str, reader: &mut dyn Read) -> std::result::Result<u64, FtpOpError>;
    fn rm(&mut self, path: &str) -> std::result::Result<(), FtpOpError>;
    /// Names in the current directory
    fn nlst(&mut self) -> std::result::Result<Vec<String>, FtpOpError>;
    fn quit(&mut self) -> std::result::Result<(), FtpOpError>;
}

impl FtpSession for FtpStream {
    fn pwd(&mut self) -> std::result::Result<String, FtpOpError> {
        Ok(FtpStream::pwd(self)?)
    }

    fn cwd(&mut self, path: &str) -> std::result::Result<(), FtpOpError> {
        Ok(FtpStream::cwd(self, path)?)
    }

    fn mkd(&mut self, path: &str) -> std::result::Result<(), FtpOpError> {
        Ok(FtpStream::mkdir(self, path)?)
    }

    fn put(&mut self, name: &str, mut reader: &mut dyn Read) -> std::result::Result<u64, FtpOpError> {
        Ok(FtpStream::put_file(self, name, &mut reader)?)
    }

    fn rm(&mut self, path: &str) -> std::result::Result<(), FtpOpError> {
        Ok(FtpStream::rm(self, path)?)
    }

    fn nlst(&mut self) -> std::result::Result<Vec<String>, FtpOpError> {
        Ok(FtpStream::nlst(self, None)?)
    }

    fn quit(&mut self) -> std::result::Result<(), FtpOpError> {
        Ok(FtpStream::quit(self)?)
    }
}

/// Opens a logged-in session for a host
pub type FtpConnector =
    Arc<dyn Fn(&RemoteHost, &Timeouts) -> std::result::Result<Box<dyn FtpSession>, FtpOpError> + Send + Sync>;

fn connect_stream(host: &RemoteHost, timeouts: &Timeouts) -> std::result::Result<Box<dyn FtpSession>, FtpOpError> {
    let password = match &host.credential {
        Credential::Password(password) => password,
        Credential::Key(_) => return Err(FtpOpError::other("FTP requires password authentication")),
    };

    let addr = (host.hostname.as_str(), host.port)
        .to_socket_addrs()
        .map_err(|e| FtpOpError::other(format!("cannot resolve {}: {}", host.hostname, e)))?
        .next()
        .ok_or_else(|| FtpOpError::other(format!("no address for {}", host.hostname)))?;

    let mut stream = FtpStream::connect_timeout(addr, timeouts.connect)?;
    stream
        .get_ref()
        .set_read_timeout(Some(timeouts.transfer))
        .map_err(|e| FtpOpError::other(e.to_string()))?;
    stream.login(host.username.as_str(), password.expose())?;
    stream.transfer_type(FileType::Binary)?;

    Ok(Box::new(stream))
}

/// Walk `path` one component at a time, creating what is missing
///
/// Each component is entered with CWD; a permanent (5xx) refusal means it
/// does not exist, so it is created with MKD and entered again. Ends with
/// the session inside `path`.
pub(crate) fn ensure_dir(session: &mut dyn FtpSession, path: &str) -> std::result::Result<(), FtpOpError> {
    if path.starts_with('/') {
        session.cwd("/")?;
    }

    for component in path_prefixes(path) {
        let step = if path.starts_with('/') {
            component.as_str()
        } else {
            component.rsplit('/').next().unwrap_or(component.as_str())
        };

        match session.cwd(step) {
            Ok(()) => {}
            Err(e) if e.is_permanent() => {
                debug!("Creating remote directory {}", component);
                session.mkd(step)?;
                session.cwd(step)?;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn base_name(entry: &str) -> &str {
    entry.trim_end_matches('/').rsplit('/').next().unwrap_or(entry)
}

pub struct FtpClient {
    host: RemoteHost,
    timeouts: Timeouts,
    connector: FtpConnector,
    session: Option<Box<dyn FtpSession>>,
    /// Working directory reported by the server, updated by `chdir`
    cwd: Option<String>,
}

impl FtpClient {
    pub fn new(host: RemoteHost, timeouts: Timeouts) -> Self {
        Self::with_connector(host, timeouts, Arc::new(connect_stream))
    }

    /// Use a custom session factory instead of a real FTP connection
    pub fn with_connector(host: RemoteHost, timeouts: Timeouts, connector: FtpConnector) -> Self {
        Self {
            host,
            timeouts,
            connector,
            session: None,
            cwd: None,
        }
    }

    /// Run `f` against the session on the blocking pool, bounded by `limit`
    ///
    /// On timeout the session stays with the stuck thread and the client
    /// counts as disconnected.
    async fn run<T, F>(&mut self, operation: &'static str, path: &str, limit: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn FtpSession) -> std::result::Result<T, FtpOpError> + Send + 'static,
        T: Send + 'static,
    {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| BackupError::transfer(operation, path, "not connected"))?;

        let task = tokio::task::spawn_blocking(move || {
            let result = f(session.as_mut());
            (session, result)
        });

        match tokio::time::timeout(limit, task).await {
            Ok(Ok((session, result))) => {
                self.session = Some(session);
                result.map_err(|e| BackupError::transfer(operation, path, e))
            }
            Ok(Err(e)) => Err(BackupError::transfer(operation, path, e)),
            Err(_) => Err(BackupError::Timeout {
                operation: operation.to_string(),
                seconds: limit.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl TransferClient for FtpClient {
    async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        info!(
            "Connecting to ftp://{}@{}:{}",
            self.host.username, self.host.hostname, self.host.port
        );

        let connector = Arc::clone(&self.connector);
        let host = self.host.clone();
        let timeouts = self.timeouts;
        let task = tokio::task::spawn_blocking(move || {
            let mut session = connector(&host, &timeouts)?;
            let home = session.pwd().ok();
            Ok::<_, FtpOpError>((session, home))
        });

        // DNS, TCP and login each get the connect timeout on their own
        let limit = self.timeouts.connect * 3;
        let (session, home) = match tokio::time::timeout(limit, task).await {
            Ok(Ok(Ok(connected))) => connected,
            Ok(Ok(Err(e))) => return Err(BackupError::connect(&self.host.hostname, e)),
            Ok(Err(e)) => return Err(BackupError::connect(&self.host.hostname, e)),
            Err(_) => {
                return Err(BackupError::connect(
                    &self.host.hostname,
                    format!("timed out after {}s", limit.as_secs()),
                ))
            }
        };

        debug!("FTP login directory: {:?}", home);
        self.session = Some(session);
        self.cwd = home;
        Ok(())
    }

    async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        let task = tokio::task::spawn_blocking(move || session.quit());
        match tokio::time::timeout(self.timeouts.connect, task).await {
            Ok(Ok(Err(e))) => debug!("FTP QUIT reported: {}", e),
            Err(_) => debug!("FTP QUIT timed out"),
            _ => {}
        }
        debug!("Disconnected from {}", self.host.hostname);
    }

    async fn mkdir(&mut self, path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        let walk = target.clone();
        self.run("mkdir", &target, self.timeouts.transfer, move |session| {
            ensure_dir(session, &walk)
        })
        .await
    }

    async fn chdir(&mut self, path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        let dir = target.clone();
        let cwd = self
            .run("chdir", &target, self.timeouts.transfer, move |session| {
                session.cwd(&dir)?;
                session.pwd()
            })
            .await?;
        self.cwd = Some(cwd);
        Ok(())
    }

    async fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), remote_path);
        let (dir, name) = split_remote(&target);
        let (dir, name) = (dir.to_string(), name.to_string());
        let source: PathBuf = local_path.to_path_buf();

        info!(
            "Uploading {} to {}:{}",
            local_path.display(),
            self.host.hostname,
            target
        );

        self.run("upload", &target, self.timeouts.transfer, move |session| {
            if !dir.is_empty() {
                ensure_dir(session, &dir)?;
            }
            let mut file = File::open(&source)
                .map_err(|e| FtpOpError::other(format!("cannot open {}: {}", source.display(), e)))?;
            session.put(&name, &mut file)
        })
        .await?;
        Ok(())
    }

    async fn delete_file(&mut self, path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        let file = target.clone();
        self.run("delete", &target, self.timeouts.transfer, move |session| {
            session.rm(&file)
        })
        .await
    }

    async fn list_files(&mut self, path: &str) -> Result<Vec<String>> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        let dir = target.clone();
        let entries = self
            .run("list", &target, self.timeouts.transfer, move |session| {
                session.cwd(&dir)?;
                session.nlst()
            })
            .await?;

        Ok(entries
            .iter()
            .map(|entry| base_name(entry))
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .map(String::from)
            .collect())
    }
}
