//! Common helpers for integration tests

use dump_manager::config::ResolvedJobDescriptor;
use dump_manager::transfer::{RealTransferFactory, TransferFactory};
use dump_manager::utils::DumpOperations;
use dump_manager::BackupManager;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use test_utils::{MockNotifier, MockTransferClient, MockTransferFactory};

/// Manager for a single job with the given collaborators
pub fn manager_for(
    job: ResolvedJobDescriptor,
    lock_dir: &Path,
    transfers: Arc<dyn TransferFactory>,
    dumper: Arc<dyn DumpOperations>,
    notifier: MockNotifier,
) -> BackupManager {
    let mut jobs = HashMap::new();
    jobs.insert(job.id.clone(), job);
    BackupManager::with_operations(jobs, lock_dir, transfers, dumper, Arc::new(notifier))
}

/// Manager writing to the local filesystem through the real client
pub fn local_manager(
    job: ResolvedJobDescriptor,
    lock_dir: &Path,
    dumper: Arc<dyn DumpOperations>,
    notifier: MockNotifier,
) -> BackupManager {
    manager_for(job, lock_dir, Arc::new(RealTransferFactory), dumper, notifier)
}

/// Manager whose destination is an in-memory listing
pub fn mocked_remote_manager(
    job: ResolvedJobDescriptor,
    lock_dir: &Path,
    client: MockTransferClient,
    dumper: Arc<dyn DumpOperations>,
    notifier: MockNotifier,
) -> BackupManager {
    manager_for(
        job,
        lock_dir,
        Arc::new(MockTransferFactory::new(client)),
        dumper,
        notifier,
    )
}

/// Files left in the job's work directory
pub fn leftover_artifacts(job: &ResolvedJobDescriptor) -> Vec<String> {
    test_utils::files_in(&job.work_directory.join(&job.id))
}
