//! SSH session shared by the SCP and SFTP clients

use crate::config::{Credential, RemoteHost};
use crate::error::{BackupError, Result};
use russh::client::{self, Handle, Msg};
use russh::keys::{load_secret_key, HashAlg, PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelMsg, ChannelStream, Disconnect};
use russh_sftp::client::SftpSession;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Accepts any host key; the fingerprint is logged at debug level
pub(crate) struct AcceptingHandler {
    host: String,
}

impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> std::result::Result<bool, Self::Error> {
        debug!(
            "Accepting host key for {}: {}",
            self.host,
            server_public_key.fingerprint(HashAlg::Sha256)
        );
        Ok(true)
    }
}

/// Result of a remote command
#[derive(Debug, Default)]
pub(crate) struct ExecOutput {
    pub exit_status: Option<u32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    /// Non-empty stdout lines, kept verbatim apart from a trailing `\r`
    pub fn stdout_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.stdout)
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Authenticated SSH connection
pub(crate) struct SshSession {
    handle: Handle<AcceptingHandler>,
}

impl SshSession {
    /// Connect and authenticate, bounded by `timeout`
    pub async fn connect(host: &RemoteHost, timeout: Duration) -> Result<Self> {
        info!(
            "Connecting to {}@{}:{}",
            host.username, host.hostname, host.port
        );

        let config = Arc::new(client::Config::default());
        let handler = AcceptingHandler {
            host: host.hostname.clone(),
        };

        let connecting = client::connect(config, (host.hostname.as_str(), host.port), handler);
        let mut handle = match tokio::time::timeout(timeout, connecting).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(BackupError::connect(&host.hostname, e)),
            Err(_) => {
                return Err(BackupError::connect(
                    &host.hostname,
                    format!("timed out after {}s", timeout.as_secs()),
                ))
            }
        };

        let authenticated = match tokio::time::timeout(timeout, authenticate(&mut handle, host)).await {
            Ok(result) => result.map_err(|reason| BackupError::connect(&host.hostname, reason))?,
            Err(_) => {
                return Err(BackupError::connect(
                    &host.hostname,
                    format!("authentication timed out after {}s", timeout.as_secs()),
                ))
            }
        };

        if !authenticated {
            return Err(BackupError::connect(
                &host.hostname,
                format!("authentication rejected for user '{}'", host.username),
            ));
        }

        debug!("SSH session established with {}", host.hostname);
        Ok(Self { handle })
    }

    /// Run `command` and collect its output and exit status
    pub async fn exec(&self, command: &str) -> std::result::Result<ExecOutput, russh::Error> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut output = ExecOutput::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => output.stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
                _ => {}
            }
        }

        Ok(output)
    }

    /// Start `command` and hand back its stdin/stdout as a byte stream
    pub async fn exec_stream(&self, command: &str) -> std::result::Result<ChannelStream<Msg>, russh::Error> {
        let channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;
        Ok(channel.into_stream())
    }

    pub async fn open_sftp(&self) -> std::result::Result<SftpSession, String> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| e.to_string())?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| e.to_string())?;
        SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn close(self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!("SSH disconnect reported: {}", e);
        }
    }
}

async fn authenticate(
    handle: &mut Handle<AcceptingHandler>,
    host: &RemoteHost,
) -> std::result::Result<bool, String> {
    match &host.credential {
        Credential::Password(password) => handle
            .authenticate_password(host.username.as_str(), password.expose())
            .await
            .map(|result| result.success())
            .map_err(|e| e.to_string()),
        Credential::Key(path) => {
            let key = load_secret_key(path, None)
                .map_err(|e| format!("cannot load key {}: {}", path.display(), e))?;
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(|e| e.to_string())?
                .flatten();
            handle
                .authenticate_publickey(
                    host.username.as_str(),
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
                .map(|result| result.success())
                .map_err(|e| e.to_string())
        }
    }
}
