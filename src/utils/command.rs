//! Utilities for running commands with proper error handling and timeouts

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("{program} failed with exit code {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Run a prepared command to completion, bounded by `timeout`
///
/// stdout/stderr are captured unless the caller already redirected them.
/// The child is killed if the deadline passes. Arguments are never logged:
/// they may carry credentials.
pub async fn run_command(mut cmd: Command, program: &str, timeout: Duration) -> Result<Output, CommandError> {
    cmd.kill_on_drop(true);

    debug!("Running command: {}", program);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?,
        Err(_) => {
            error!("Command timed out after {:?}: {}", timeout, program);
            return Err(CommandError::Timeout {
                program: program.to_string(),
                seconds: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!("Command failed: {}", program);
        error!("Stderr: {}", stderr);
        return Err(CommandError::Failed {
            program: program.to_string(),
            code: output.status.code(),
            stderr,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
        debug!("Command output: {}", stdout);
    }

    Ok(output)
}
