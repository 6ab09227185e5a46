//! File-based locking to prevent overlapping runs of the same backup

use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lock file for one backup id
///
/// Open it, then hold the guard returned by [`JobLock::try_acquire`] for as
/// long as the job runs. The lock file itself is left in place: removing it
/// while another process has it open would let two holders coexist.
pub struct JobLock {
    job_id: String,
    lock_path: PathBuf,
    lock: RwLock<File>,
}

/// Exclusive hold on a [`JobLock`], released on drop
pub struct JobLockGuard<'a> {
    _guard: RwLockWriteGuard<'a, File>,
    job_id: &'a str,
}

impl JobLock {
    /// Open (or create) the lock file for `job_id` under `lock_dir`
    pub fn open(lock_dir: &Path, job_id: &str) -> Result<Self> {
        let lock_path = Self::lock_path(lock_dir, job_id);

        debug!("Opening lock file: {:?}", lock_path);

        std::fs::create_dir_all(lock_dir).context("Failed to create lock directory")?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {:?}", lock_path))?;

        Ok(Self {
            job_id: job_id.to_string(),
            lock_path,
            lock: RwLock::new(file),
        })
    }

    /// Take the lock without waiting
    ///
    /// Fails if another process (or another task in this one) holds it.
    pub fn try_acquire(&mut self) -> Result<JobLockGuard<'_>> {
        let job_id = self.job_id.as_str();
        let guard = self.lock.try_write().with_context(|| {
            format!("Backup '{}' is already running (lock held)", job_id)
        })?;

        info!("Acquired backup lock for: {}", job_id);

        Ok(JobLockGuard {
            _guard: guard,
            job_id,
        })
    }

    /// Get the lock file path for a backup
    pub fn lock_path(lock_dir: &Path, job_id: &str) -> PathBuf {
        lock_dir.join(format!("dump-manager-{}.lock", job_id))
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for JobLockGuard<'_> {
    fn drop(&mut self) {
        info!("Released backup lock for: {}", self.job_id);
    }
}
