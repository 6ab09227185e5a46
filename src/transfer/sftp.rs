//! SFTP client over the SSH `sftp` subsystem

use super::ssh::SshSession;
use super::{path_prefixes, resolve_remote, split_remote, with_timeout, TransferClient};
use crate::config::{RemoteHost, Timeouts};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub struct SftpClient {
    host: RemoteHost,
    timeouts: Timeouts,
    ssh: Option<SshSession>,
    sftp: Option<SftpSession>,
    cwd: Option<String>,
}

impl SftpClient {
    pub fn new(host: RemoteHost, timeouts: Timeouts) -> Self {
        Self {
            host,
            timeouts,
            ssh: None,
            sftp: None,
            cwd: None,
        }
    }

    fn sftp(&self, operation: &'static str, path: &str) -> Result<&SftpSession> {
        self.sftp
            .as_ref()
            .ok_or_else(|| BackupError::transfer(operation, path, "not connected"))
    }
}

/// Directory calls `mkdir` needs from an SFTP session
#[async_trait]
pub trait SftpDirs: Send + Sync {
    /// `Some(is_dir)` when `path` can be stat'ed, `None` otherwise
    async fn is_dir(&self, path: &str) -> Option<bool>;
    async fn create_dir(&self, path: &str) -> std::result::Result<(), String>;
}

#[async_trait]
impl SftpDirs for SftpSession {
    async fn is_dir(&self, path: &str) -> Option<bool> {
        self.metadata(path).await.ok().map(|m| m.is_dir())
    }

    async fn create_dir(&self, path: &str) -> std::result::Result<(), String> {
        SftpSession::create_dir(self, path)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Create each missing component of `path`
///
/// A component is stat'ed first and created only when absent. If the
/// create fails, a second stat decides: a directory that appeared in the
/// meantime is fine, anything else is an error.
pub async fn ensure_dir<S: SftpDirs + ?Sized>(sftp: &S, path: &str) -> Result<()> {
    for component in path_prefixes(path) {
        match sftp.is_dir(&component).await {
            Some(true) => continue,
            Some(false) => {
                return Err(BackupError::transfer("mkdir", component, "exists and is not a directory"))
            }
            None => {}
        }

        debug!("Creating remote directory {}", component);
        if let Err(e) = sftp.create_dir(&component).await {
            if sftp.is_dir(&component).await != Some(true) {
                return Err(BackupError::transfer("mkdir", component, e));
            }
            debug!("Remote directory {} appeared concurrently", component);
        }
    }
    Ok(())
}

#[async_trait]
impl TransferClient for SftpClient {
    async fn connect(&mut self) -> Result<()> {
        if self.sftp.is_some() {
            return Ok(());
        }

        let ssh = SshSession::connect(&self.host, self.timeouts.connect).await?;
        let sftp = match tokio::time::timeout(self.timeouts.connect, ssh.open_sftp()).await {
            Ok(Ok(sftp)) => sftp,
            Ok(Err(reason)) => {
                ssh.close().await;
                return Err(BackupError::connect(
                    &self.host.hostname,
                    format!("sftp subsystem unavailable: {}", reason),
                ));
            }
            Err(_) => {
                ssh.close().await;
                return Err(BackupError::connect(&self.host.hostname, "sftp subsystem timed out"));
            }
        };

        self.ssh = Some(ssh);
        self.sftp = Some(sftp);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(sftp) = self.sftp.take() {
            let _ = tokio::time::timeout(self.timeouts.connect, sftp.close()).await;
        }
        if let Some(ssh) = self.ssh.take() {
            let _ = tokio::time::timeout(self.timeouts.connect, ssh.close()).await;
            debug!("Disconnected from {}", self.host.hostname);
        }
    }

    async fn mkdir(&mut self, path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        let sftp = self.sftp("mkdir", &target)?;
        with_timeout("mkdir", self.timeouts.transfer, ensure_dir(sftp, &target)).await
    }

    async fn chdir(&mut self, path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        let sftp = self.sftp("chdir", &target)?;

        if sftp.is_dir(&target).await != Some(true) {
            return Err(BackupError::transfer("chdir", target, "not a directory"));
        }
        let canonical = sftp
            .canonicalize(target.as_str())
            .await
            .map_err(|e| BackupError::transfer("chdir", target.as_str(), e))?;

        self.cwd = Some(canonical);
        Ok(())
    }

    async fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), remote_path);
        let (dir, _) = split_remote(&target);
        if !dir.is_empty() {
            self.mkdir(dir).await?;
        }

        let mut local = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| BackupError::transfer("upload", target.as_str(), e))?;

        info!(
            "Uploading {} to {}:{}",
            local_path.display(),
            self.host.hostname,
            target
        );

        let sftp = self.sftp("upload", &target)?;
        let result = with_timeout("upload", self.timeouts.transfer, async {
            let mut remote = sftp
                .create(target.as_str())
                .await
                .map_err(|e| BackupError::transfer("upload", target.as_str(), e))?;
            tokio::io::copy(&mut local, &mut remote)
                .await
                .map_err(|e| BackupError::transfer("upload", target.as_str(), e))?;
            remote
                .shutdown()
                .await
                .map_err(|e| BackupError::transfer("upload", target.as_str(), e))
        })
        .await;

        if result.is_err() {
            if let Err(e) = sftp.remove_file(target.as_str()).await {
                warn!("Could not remove partial upload {}: {}", target, e);
            }
        }
        result
    }

    async fn delete_file(&mut self, path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        let sftp = self.sftp("delete", &target)?;
        with_timeout("delete", self.timeouts.transfer, async {
            sftp.remove_file(target.as_str())
                .await
                .map_err(|e| BackupError::transfer("delete", target.as_str(), e))
        })
        .await
    }

    async fn list_files(&mut self, path: &str) -> Result<Vec<String>> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        let sftp = self.sftp("list", &target)?;
        let entries = with_timeout("list", self.timeouts.transfer, async {
            sftp.read_dir(target.as_str())
                .await
                .map_err(|e| BackupError::transfer("list", target.as_str(), e))
        })
        .await?;

        Ok(entries
            .map(|entry| entry.file_name())
            .filter(|name| name != "." && name != "..")
            .collect())
    }
}
