//! Recording transfer client for tests

use super::{split_remote, TransferClient, TransferFactory};
use crate::config::{Destination, Timeouts};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Recorded client call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferCall {
    Connect,
    Disconnect,
    Mkdir(String),
    Chdir(String),
    Upload { local: PathBuf, remote: String },
    Delete(String),
    List(String),
}

/// Client whose remote side is an in-memory list of file names
///
/// Clones share state, so a test keeps one handle while the pipeline owns
/// another.
#[derive(Clone, Default)]
pub struct MockTransferClient {
    calls: Arc<Mutex<Vec<TransferCall>>>,
    files: Arc<Mutex<Vec<String>>>,
    uploads: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    /// Operation name ("connect", "upload", ...) to error message
    failures: Arc<Mutex<HashMap<&'static str, String>>>,
}

impl MockTransferClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names already present in the destination directory
    pub fn with_files<S: AsRef<str>>(self, names: &[S]) -> Self {
        self.files
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.as_ref().to_string()));
        self
    }

    /// Fail every call of `operation` with `message`
    pub fn with_failure(self, operation: &'static str, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(operation, message.to_string());
        self
    }

    pub fn get_calls(&self) -> Vec<TransferCall> {
        self.calls.lock().unwrap().clone()
    }

    /// (remote path, bytes) for each completed upload
    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.get_calls()
            .into_iter()
            .filter_map(|call| match call {
                TransferCall::Delete(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn remaining_files(&self) -> Vec<String> {
        self.files.lock().unwrap().clone()
    }

    pub fn was_called(&self, call: &TransferCall) -> bool {
        self.calls.lock().unwrap().contains(call)
    }

    fn record(&self, call: TransferCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, operation: &'static str, path: &str) -> Result<()> {
        match self.failures.lock().unwrap().get(operation) {
            Some(message) if operation == "connect" => Err(BackupError::connect("mock", message)),
            Some(message) => Err(BackupError::transfer(operation, path, message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TransferClient for MockTransferClient {
    async fn connect(&mut self) -> Result<()> {
        self.record(TransferCall::Connect);
        self.check("connect", "")
    }

    async fn disconnect(&mut self) {
        self.record(TransferCall::Disconnect);
    }

    async fn mkdir(&mut self, path: &str) -> Result<()> {
        self.record(TransferCall::Mkdir(path.to_string()));
        self.check("mkdir", path)
    }

    async fn chdir(&mut self, path: &str) -> Result<()> {
        self.record(TransferCall::Chdir(path.to_string()));
        self.check("chdir", path)
    }

    async fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.record(TransferCall::Upload {
            local: local_path.to_path_buf(),
            remote: remote_path.to_string(),
        });
        self.check("upload", remote_path)?;

        let data = std::fs::read(local_path)
            .map_err(|e| BackupError::transfer("upload", remote_path, e))?;
        self.uploads
            .lock()
            .unwrap()
            .push((remote_path.to_string(), data));

        let (_, name) = split_remote(remote_path);
        self.files.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn delete_file(&mut self, path: &str) -> Result<()> {
        self.record(TransferCall::Delete(path.to_string()));
        self.check("delete", path)?;

        let (_, name) = split_remote(path);
        self.files.lock().unwrap().retain(|existing| existing != name);
        Ok(())
    }

    async fn list_files(&mut self, path: &str) -> Result<Vec<String>> {
        self.record(TransferCall::List(path.to_string()));
        self.check("list", path)?;
        Ok(self.remaining_files())
    }
}

/// Factory handing out clones of one [`MockTransferClient`]
#[derive(Clone, Default)]
pub struct MockTransferFactory {
    pub client: MockTransferClient,
    created: Arc<Mutex<usize>>,
}

impl MockTransferFactory {
    pub fn new(client: MockTransferClient) -> Self {
        Self {
            client,
            created: Arc::default(),
        }
    }

    /// Number of clients created so far
    pub fn created(&self) -> usize {
        *self.created.lock().unwrap()
    }
}

impl TransferFactory for MockTransferFactory {
    fn create(&self, _destination: &Destination, _timeouts: &Timeouts) -> Box<dyn TransferClient> {
        *self.created.lock().unwrap() += 1;
        Box::new(self.client.clone())
    }
}
