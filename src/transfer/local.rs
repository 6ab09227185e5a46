use super::{with_timeout, TransferClient};
use crate::error::{BackupError, Result};
use crate::utils::compression::append_suffix;
use async_trait::async_trait;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Filesystem destination; "connecting" is a no-op
pub struct LocalClient {
    cwd: Option<PathBuf>,
    timeout: Duration,
}

impl LocalClient {
    pub fn new(timeout: Duration) -> Self {
        Self { cwd: None, timeout }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.cwd {
            Some(cwd) if path.is_relative() => cwd.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Copy `source` over `target` via a sibling `.part` file
///
/// Permissions and modification time follow the source. The partial file is
/// removed if any step fails.
fn copy_into_place(source: &Path, target: &Path) -> io::Result<()> {
    if target.is_dir() {
        return Err(io::Error::other("destination is a directory"));
    }

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let partial = append_suffix(target, ".part");
    let result = (|| {
        fs::copy(source, &partial)?;
        let modified = fs::metadata(source)?.modified()?;
        File::options().write(true).open(&partial)?.set_modified(modified)?;
        fs::rename(&partial, target)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

async fn blocking<T, F>(operation: &'static str, path: String, limit: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    with_timeout(operation, limit, async move {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| BackupError::transfer(operation, path.clone(), e))?
            .map_err(|e| BackupError::transfer(operation, path, e))
    })
    .await
}

#[async_trait]
impl TransferClient for LocalClient {
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&mut self) {}

    async fn mkdir(&mut self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        blocking("mkdir", path.to_string(), self.timeout, move || {
            fs::create_dir_all(&target)
        })
        .await
    }

    async fn chdir(&mut self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        if !target.is_dir() {
            return Err(BackupError::transfer("chdir", path, "not a directory"));
        }
        self.cwd = Some(target);
        Ok(())
    }

    async fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        let source = local_path.to_path_buf();
        let target = self.resolve(remote_path);
        debug!("Copying {} to {}", source.display(), target.display());

        blocking("upload", remote_path.to_string(), self.timeout, move || {
            copy_into_place(&source, &target)
        })
        .await
    }

    async fn delete_file(&mut self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        blocking("delete", path.to_string(), self.timeout, move || {
            fs::remove_file(&target)
        })
        .await
    }

    async fn list_files(&mut self, path: &str) -> Result<Vec<String>> {
        let target = self.resolve(path);
        blocking("list", path.to_string(), self.timeout, move || {
            fs::read_dir(&target)?
                .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
                .collect()
        })
        .await
    }
}
