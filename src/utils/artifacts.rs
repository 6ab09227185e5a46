//! Local files produced while a job runs
//!
//! Every stage registers its output path here before writing to it. When the
//! set is dropped (success, error, or panic unwinding) all registered files
//! are removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct ArtifactSet {
    job_id: String,
    paths: Vec<PathBuf>,
}

impl ArtifactSet {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            paths: Vec::new(),
        }
    }

    /// Register a path that is about to be written
    pub fn track(&mut self, path: PathBuf) -> &Path {
        debug!("[{}] Tracking artifact {}", self.job_id, path.display());
        self.paths.push(path);
        &self.paths[self.paths.len() - 1]
    }

    /// The most recently registered artifact, i.e. the one the next stage consumes
    pub fn current(&self) -> Option<&Path> {
        self.paths.last().map(PathBuf::as_path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Remove every registered file; files that were never created are ignored
    pub fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => debug!("[{}] Removed artifact {}", self.job_id, path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    "[{}] Failed to remove artifact {}: {}",
                    self.job_id,
                    path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for ArtifactSet {
    fn drop(&mut self) {
        self.cleanup();
    }
}
