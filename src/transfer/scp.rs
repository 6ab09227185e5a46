//! SCP-over-SSH client
//!
//! Files go through the classic `scp -t` sink protocol on an exec channel;
//! directory and listing operations are plain shell commands with every
//! path single-quoted.

use super::ssh::{ExecOutput, SshSession};
use super::{resolve_remote, shell_quote, split_remote, with_timeout, TransferClient};
use crate::config::{RemoteHost, Timeouts};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Longest error line accepted from the remote scp
const MAX_ACK_MESSAGE: usize = 1024;

pub struct ScpClient {
    host: RemoteHost,
    timeouts: Timeouts,
    session: Option<SshSession>,
    cwd: Option<String>,
}

impl ScpClient {
    pub fn new(host: RemoteHost, timeouts: Timeouts) -> Self {
        Self {
            host,
            timeouts,
            session: None,
            cwd: None,
        }
    }

    fn session(&self, operation: &'static str, path: &str) -> Result<&SshSession> {
        self.session
            .as_ref()
            .ok_or_else(|| BackupError::transfer(operation, path, "not connected"))
    }

    /// Run a remote command, failing on a nonzero exit status
    async fn run(&self, operation: &'static str, path: &str, command: String) -> Result<ExecOutput> {
        let session = self.session(operation, path)?;
        debug!("Remote {}: {}", operation, command);

        let output = with_timeout(operation, self.timeouts.transfer, async {
            session
                .exec(&command)
                .await
                .map_err(|e| BackupError::transfer(operation, path, e))
        })
        .await?;

        match output.exit_status {
            Some(0) => Ok(output),
            Some(code) => Err(BackupError::transfer(
                operation,
                path,
                format!("remote command exited with {}: {}", code, output.stderr_text()),
            )),
            None => Err(BackupError::transfer(
                operation,
                path,
                "remote command ended without exit status",
            )),
        }
    }
}

pub(crate) fn mkdir_command(path: &str) -> String {
    format!("mkdir -p -- {}", shell_quote(path))
}

pub(crate) fn delete_command(path: &str) -> String {
    format!("rm -- {}", shell_quote(path))
}

pub(crate) fn list_command(path: &str) -> String {
    format!("ls -1 -- {}", shell_quote(path))
}

pub(crate) fn is_dir_command(path: &str) -> String {
    format!("test -d {}", shell_quote(path))
}

pub(crate) fn sink_command(path: &str) -> String {
    format!("scp -t -- {}", shell_quote(path))
}

/// Read one scp acknowledgement; 1 and 2 carry an error line
async fn read_ack<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<()> {
    let mut code = [0u8; 1];
    stream.read_exact(&mut code).await?;

    match code[0] {
        0 => Ok(()),
        1 | 2 => {
            let mut message = Vec::new();
            let mut byte = [0u8; 1];
            while message.len() < MAX_ACK_MESSAGE {
                if stream.read(&mut byte).await? == 0 || byte[0] == b'\n' {
                    break;
                }
                message.push(byte[0]);
            }
            Err(io::Error::other(format!(
                "remote scp: {}",
                String::from_utf8_lossy(&message).trim()
            )))
        }
        other => Err(io::Error::other(format!(
            "unexpected scp response byte {}",
            other
        ))),
    }
}

/// Push one file through an `scp -t` sink
pub(crate) async fn send_file<S, R>(stream: &mut S, mut source: R, size: u64, mode: u32, name: &str) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    read_ack(stream).await?;

    let header = format!("C{:04o} {} {}\n", mode & 0o7777, size, name);
    stream.write_all(header.as_bytes()).await?;
    read_ack(stream).await?;

    let copied = tokio::io::copy(&mut (&mut source).take(size), stream).await?;
    if copied != size {
        return Err(io::Error::other(format!(
            "file shrank during upload ({} of {} bytes)",
            copied, size
        )));
    }
    stream.write_all(&[0]).await?;
    read_ack(stream).await?;

    stream.shutdown().await
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

#[async_trait]
impl TransferClient for ScpClient {
    async fn connect(&mut self) -> Result<()> {
        if self.session.is_none() {
            self.session = Some(SshSession::connect(&self.host, self.timeouts.connect).await?);
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = tokio::time::timeout(self.timeouts.connect, session.close()).await;
            debug!("Disconnected from {}", self.host.hostname);
        }
    }

    async fn mkdir(&mut self, path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        self.run("mkdir", &target, mkdir_command(&target)).await?;
        Ok(())
    }

    async fn chdir(&mut self, path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        self.run("chdir", &target, is_dir_command(&target))
            .await
            .map_err(|_| BackupError::transfer("chdir", target.as_str(), "not a directory"))?;
        self.cwd = Some(target);
        Ok(())
    }

    async fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), remote_path);
        let (dir, name) = split_remote(&target);
        if !dir.is_empty() {
            self.mkdir(dir).await?;
        }

        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| BackupError::transfer("upload", target.as_str(), e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| BackupError::transfer("upload", target.as_str(), e))?;

        info!(
            "Uploading {} ({} bytes) to {}:{}",
            local_path.display(),
            metadata.len(),
            self.host.hostname,
            target
        );

        let session = self.session("upload", &target)?;
        with_timeout("upload", self.timeouts.transfer, async {
            let mut stream = session
                .exec_stream(&sink_command(&target))
                .await
                .map_err(|e| BackupError::transfer("upload", target.as_str(), e))?;
            send_file(&mut stream, file, metadata.len(), file_mode(&metadata), name)
                .await
                .map_err(|e| BackupError::transfer("upload", target.as_str(), e))
        })
        .await
    }

    async fn delete_file(&mut self, path: &str) -> Result<()> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        self.run("delete", &target, delete_command(&target)).await?;
        Ok(())
    }

    async fn list_files(&mut self, path: &str) -> Result<Vec<String>> {
        let target = resolve_remote(self.cwd.as_deref(), path);
        let output = self.run("list", &target, list_command(&target)).await?;
        Ok(output.stdout_lines())
    }
}
