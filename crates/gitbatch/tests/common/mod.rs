//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use gitbatch::git::{
    GitError, LocalStateProber, ProbeError, ProcessError, ProcessExecutor, ProcessOutput,
    ProtocolState, RemoteSwitcher, classify_remote_url,
};
use gitbatch::{
    InventoryBatch, InventoryClient, InventoryRequest, ProgressCallback, RemoteError,
    RepositoryDescriptor, SyncProgress,
};

pub fn repo(root: &Path, name: &str) -> RepositoryDescriptor {
    RepositoryDescriptor {
        name: name.to_string(),
        https_url: format!("https://github.com/acme/{name}.git"),
        ssh_url: format!("git@github.com:acme/{name}.git"),
        local_path: root.join("acme").join(name),
        default_branch: Some("main".to_string()),
        is_private: false,
        is_archived: false,
        is_fork: false,
        last_updated: None,
    }
}

/// Serves a fixed inventory and counts fetches.
pub struct FakeInventory {
    repos: Vec<RepositoryDescriptor>,
    pub fetches: Mutex<usize>,
}

impl FakeInventory {
    pub fn new(repos: Vec<RepositoryDescriptor>) -> Self {
        Self {
            repos,
            fetches: Mutex::new(0),
        }
    }
}

#[async_trait]
impl InventoryClient for FakeInventory {
    async fn fetch_inventory(
        &self,
        request: &InventoryRequest,
        _on_progress: Option<&ProgressCallback>,
    ) -> Result<InventoryBatch, RemoteError> {
        *self.fetches.lock().unwrap() += 1;
        Ok(InventoryBatch::new(
            request.entity_type,
            request.entity_name.clone(),
            Utc::now(),
            self.repos.clone(),
        ))
    }
}

/// Working copies held in memory. Probing reads the map; switching rewrites it.
#[derive(Default)]
pub struct FakeWorkspace {
    states: Mutex<HashMap<PathBuf, ProtocolState>>,
    pub switches: Mutex<Vec<String>>,
}

impl FakeWorkspace {
    pub fn set(&self, repo: &RepositoryDescriptor, state: ProtocolState) {
        self.states
            .lock()
            .unwrap()
            .insert(repo.local_path.clone(), state);
    }

    pub fn switch_count(&self) -> usize {
        self.switches.lock().unwrap().len()
    }
}

#[async_trait]
impl LocalStateProber for FakeWorkspace {
    async fn probe(&self, path: &Path) -> Result<ProtocolState, ProbeError> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(ProtocolState::NoneLocal))
    }
}

#[async_trait]
impl RemoteSwitcher for FakeWorkspace {
    async fn switch(&self, path: &Path, url: &str) -> Result<(), GitError> {
        self.switches.lock().unwrap().push(url.to_string());
        self.states
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), classify_remote_url(url));
        Ok(())
    }
}

/// Process executor that records every call and fails any command whose
/// arguments mention one of `failing`.
#[derive(Default)]
pub struct RecordingExecutor {
    failing: Vec<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingExecutor {
    pub fn failing_for(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessExecutor for RecordingExecutor {
    async fn run(
        &self,
        _program: &str,
        args: &[String],
        _cwd: &Path,
        _timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(args.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let fails = args.iter().any(|arg| {
            self.failing
                .iter()
                .any(|f| arg.ends_with(&format!("/{f}")) || arg.ends_with(&format!("/{f}.git")))
        });
        Ok(ProcessOutput {
            exit_code: if fails { 128 } else { 0 },
            stdout: String::new(),
            stderr: if fails {
                "fatal: could not read from remote repository".to_string()
            } else {
                String::new()
            },
        })
    }
}

pub fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<SyncProgress>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: ProgressCallback = Box::new(move |event| sink.lock().unwrap().push(event));
    (callback, events)
}
