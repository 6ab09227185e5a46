//! Backup manager - orchestrates backup execution
//!
//! One job runs linearly through
//! `Dumping -> [Compressing] -> [Encrypting] -> Uploading -> Pruning -> Notifying`.
//! The first failing stage ends the job. Local artifacts are removed on every
//! exit path, the transfer session is always closed, and the outcome is
//! always reported.

use crate::config::ResolvedJobDescriptor;
use crate::error::{BackupError, ErrorKind, Result};
use crate::managers::notification::{BackupReport, NotificationDispatcher, NotificationSink};
use crate::transfer::{destination_dir, join_remote, RealTransferFactory, TransferClient, TransferFactory};
use crate::utils::artifacts::ArtifactSet;
use crate::utils::compression::{compress_into_async, compressed_path};
use crate::utils::dump::{DumpOperations, MysqlDumper};
use crate::utils::encryption::{encrypt_into_async, encrypted_path};
use crate::utils::locker::JobLock;
use crate::utils::retention::select_for_deletion;
use anyhow::Context;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Pipeline states, in the order a successful job visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Init,
    Dumping,
    Compressing,
    Encrypting,
    Uploading,
    Pruning,
    Notifying,
    Done,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Init => "init",
            JobStage::Dumping => "dumping",
            JobStage::Compressing => "compressing",
            JobStage::Encrypting => "encrypting",
            JobStage::Uploading => "uploading",
            JobStage::Pruning => "pruning",
            JobStage::Notifying => "notifying",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one job run
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: String,
    pub success: bool,
    pub error: Option<BackupError>,
    /// Stage that was running when the job failed
    pub failed_stage: Option<JobStage>,
    /// Every state entered, in order
    pub stages: Vec<JobStage>,
    /// Path of the uploaded artifact at the destination
    pub remote_file: Option<String>,
    /// Backups removed by retention
    pub deleted: Vec<String>,
    pub duration: Duration,
}

impl JobOutcome {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(BackupError::kind)
    }

    pub fn visited(&self, stage: JobStage) -> bool {
        self.stages.contains(&stage)
    }
}

/// What the transfer stages produced
#[derive(Debug, Default)]
struct Shipped {
    remote_file: Option<String>,
    deleted: Vec<String>,
}

/// Totals of a multi-job run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: Vec<String>,
    /// (job id, error message)
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct BackupManager {
    jobs: Arc<HashMap<String, ResolvedJobDescriptor>>,
    lock_directory: PathBuf,
    transfers: Arc<dyn TransferFactory>,
    dumper: Arc<dyn DumpOperations>,
    notifier: Arc<dyn NotificationSink>,
}

impl BackupManager {
    /// Create a backup manager using mysqldump, the real transfer clients and notifiers
    pub fn new(jobs: HashMap<String, ResolvedJobDescriptor>, lock_directory: &Path) -> Self {
        Self::with_operations(
            jobs,
            lock_directory,
            Arc::new(RealTransferFactory),
            Arc::new(MysqlDumper::new()),
            Arc::new(NotificationDispatcher),
        )
    }

    /// Create a backup manager with custom collaborators (for testing)
    pub fn with_operations(
        jobs: HashMap<String, ResolvedJobDescriptor>,
        lock_directory: &Path,
        transfers: Arc<dyn TransferFactory>,
        dumper: Arc<dyn DumpOperations>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            jobs: Arc::new(jobs),
            lock_directory: lock_directory.to_path_buf(),
            transfers,
            dumper,
            notifier,
        }
    }

    pub fn get_job(&self, id: &str) -> Option<&ResolvedJobDescriptor> {
        self.jobs.get(id)
    }

    /// Sorted ids of all configured jobs
    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Run one job while holding its lock
    ///
    /// Returns `Ok(None)` for a disabled job. Errors mean the job could not
    /// start (unknown id, lock held); pipeline failures are reported in the
    /// outcome instead.
    pub async fn run_job(&self, id: &str) -> anyhow::Result<Option<JobOutcome>> {
        let job = self
            .jobs
            .get(id)
            .with_context(|| format!("Backup not found: {}", id))?;

        if !job.enabled {
            info!("Backup '{}' is disabled, skipping", id);
            return Ok(None);
        }

        let mut lock = JobLock::open(&self.lock_directory, id)
            .with_context(|| format!("Failed to open lock for backup '{}'", id))?;
        let _guard = lock.try_acquire()?;

        Ok(Some(self.execute(job).await))
    }

    /// Run every enabled job concurrently
    pub async fn run_all(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut handles = Vec::new();

        for id in self.job_ids() {
            let manager = self.clone();
            let task_id = id.clone();
            handles.push((id, tokio::spawn(async move { manager.run_job(&task_id).await })));
        }

        if handles.is_empty() {
            warn!("No backups configured");
            return summary;
        }

        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(Some(outcome))) if outcome.success => summary.succeeded.push(id),
                Ok(Ok(Some(outcome))) => {
                    let reason = outcome
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unknown error".to_string());
                    summary.failed.push((id, reason));
                }
                Ok(Ok(None)) => summary.skipped.push(id),
                Ok(Err(e)) => {
                    error!("Backup '{}' could not start: {:#}", id, e);
                    summary.failed.push((id, format!("{:#}", e)));
                }
                Err(e) => {
                    error!("Backup '{}' task aborted: {}", id, e);
                    summary.failed.push((id, e.to_string()));
                }
            }
        }

        info!(
            "Backup summary: {} succeeded, {} failed, {} skipped",
            summary.succeeded.len(),
            summary.failed.len(),
            summary.skipped.len()
        );

        summary
    }

    /// Drive one job through the pipeline
    pub async fn execute(&self, job: &ResolvedJobDescriptor) -> JobOutcome {
        let start = Instant::now();
        let mut stages = vec![JobStage::Init];

        info!(
            "[{}] Starting backup of '{}' to {} ({})",
            job.id,
            job.database.database,
            job.host_name(),
            job.protocol_name()
        );

        let result = {
            let mut artifacts = ArtifactSet::new(&job.id);
            let result = self.run_stages(job, &mut artifacts, &mut stages).await;
            artifacts.cleanup();
            result
        };
        let duration = start.elapsed();

        let (shipped, error, failed_stage) = match result {
            Ok(shipped) => (shipped, None, None),
            Err(e) => {
                let stage = stages.last().copied();
                error!(
                    "[{}] Backup failed during {}: {}",
                    job.id,
                    stage.unwrap_or(JobStage::Init),
                    e
                );
                stages.push(JobStage::Failed);
                (Shipped::default(), Some(e), stage)
            }
        };
        let success = error.is_none();

        stages.push(JobStage::Notifying);
        let report = BackupReport {
            job_id: job.id.clone(),
            success,
            error: error.as_ref().map(|e| e.to_string()),
            database: job.database.database.clone(),
            host: job.host_name(),
            protocol: job.protocol_name().to_string(),
            compressed: job.compression_enabled,
            encrypted: job.encryption_enabled(),
            duration_secs: duration.as_secs(),
        };
        if let Err(e) = self.notifier.notify(&job.notifications, &report).await {
            warn!("[{}] Notification failed: {}", job.id, e);
        }

        if success {
            stages.push(JobStage::Done);
            info!(
                "[{}] Backup completed in {:.2}s",
                job.id,
                duration.as_secs_f64()
            );
        }

        JobOutcome {
            job_id: job.id.clone(),
            success,
            error,
            failed_stage,
            stages,
            remote_file: shipped.remote_file,
            deleted: shipped.deleted,
            duration,
        }
    }

    async fn run_stages(
        &self,
        job: &ResolvedJobDescriptor,
        artifacts: &mut ArtifactSet,
        stages: &mut Vec<JobStage>,
    ) -> Result<Shipped> {
        stages.push(JobStage::Dumping);
        let work_dir = job.work_directory.join(&job.id);
        std::fs::create_dir_all(&work_dir).map_err(|e| {
            BackupError::Dump(format!("cannot create work directory {}: {}", work_dir.display(), e))
        })?;

        let timestamp = chrono::Local::now().format(&job.date_format).to_string();
        let dump_path = artifacts
            .track(work_dir.join(format!("{}{}.sql", job.prefix, timestamp)))
            .to_path_buf();
        self.dumper
            .dump(&job.database, &job.skip_tables, &dump_path, job.timeouts.dump)
            .await?;
        let mut current = dump_path;

        if job.compression_enabled {
            stages.push(JobStage::Compressing);
            info!("[{}] Compressing {}", job.id, current.display());
            let target = artifacts.track(compressed_path(&current)).to_path_buf();
            compress_into_async(current, target.clone()).await?;
            current = target;
        }

        if let Some(passphrase) = &job.encryption_passphrase {
            stages.push(JobStage::Encrypting);
            info!("[{}] Encrypting {}", job.id, current.display());
            let target = artifacts.track(encrypted_path(&current)).to_path_buf();
            encrypt_into_async(current, target.clone(), passphrase.clone()).await?;
            current = target;
        }

        stages.push(JobStage::Uploading);
        let mut client = self.transfers.create(&job.destination, &job.timeouts);
        let shipped = self.ship(job, client.as_mut(), &current, stages).await;
        client.disconnect().await;
        shipped
    }

    /// Upload the final artifact and prune old backups over one session
    async fn ship(
        &self,
        job: &ResolvedJobDescriptor,
        client: &mut dyn TransferClient,
        artifact: &Path,
        stages: &mut Vec<JobStage>,
    ) -> Result<Shipped> {
        let dir = destination_dir(&job.destination);
        let name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BackupError::transfer("upload", artifact.display().to_string(), "invalid file name"))?;
        let remote_file = join_remote(&dir, name);

        client.connect().await?;
        client.mkdir(&dir).await?;
        info!("[{}] Uploading to {}:{}", job.id, job.host_name(), remote_file);
        client.upload_file(artifact, &remote_file).await?;

        stages.push(JobStage::Pruning);
        let listing = client
            .list_files(&dir)
            .await
            .map_err(|e| BackupError::Retention(format!("cannot list {}: {}", dir, e)))?;

        let doomed = select_for_deletion(&listing, &job.prefix, &job.date_format, job.max_backup_files);
        if doomed.is_empty() {
            info!(
                "[{}] Retention: {} backup(s) within limit of {}",
                job.id,
                listing.len(),
                job.max_backup_files
            );
        }

        let mut deleted = Vec::with_capacity(doomed.len());
        for name in doomed {
            let path = join_remote(&dir, &name);
            info!("[{}] Retention: deleting {}", job.id, path);
            client.delete_file(&path).await?;
            deleted.push(name);
        }

        Ok(Shipped {
            remote_file: Some(remote_file),
            deleted,
        })
    }
}
