//! Protocol reconciliation.
//!
//! Compares the protocol each existing working copy uses with the protocol
//! the operator asked for, resolves every mismatch exactly once according to
//! a [`ResolutionPolicy`], and produces the per-repository plan the engine
//! executes.
//!
//! Repositories without a local copy never produce a mismatch: they are
//! cloned with the desired protocol.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::git::{LocalStateProber, ProbeError, Protocol, ProtocolState, RemoteSwitcher};
use crate::remote::{InventoryBatch, RepositoryDescriptor};
use crate::sync::{ProgressCallback, SyncProgress, emit};
use crate::validate::{PathValidator, Sanitizer};

/// How mismatches are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPolicy {
    /// Ask once per mismatch; a declined or unanswerable prompt keeps the
    /// existing protocol.
    #[default]
    Interactive,
    /// Always switch to the desired protocol.
    Automatic,
    /// Never switch.
    Skip,
}

impl ResolutionPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Automatic => "automatic",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interactive" | "prompt" => Ok(Self::Interactive),
            "automatic" | "auto" => Ok(Self::Automatic),
            "skip" => Ok(Self::Skip),
            other => Err(format!(
                "unknown protocol policy '{other}' (expected interactive, automatic or skip)"
            )),
        }
    }
}

/// A working copy whose protocol differs from the desired one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMismatch {
    pub repository: String,
    pub path: PathBuf,
    pub current: Protocol,
    pub desired: Protocol,
}

/// Asks the operator whether to switch a working copy's protocol.
pub trait SwitchPrompter: Send + Sync {
    fn confirm_switch(&self, mismatch: &ProtocolMismatch) -> bool;
}

/// Declines every switch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineAll;

impl SwitchPrompter for DeclineAll {
    fn confirm_switch(&self, _mismatch: &ProtocolMismatch) -> bool {
        false
    }
}

/// Probe results for one inventory, keyed by repository name.
#[derive(Debug, Clone, Default)]
pub struct LocalStates {
    states: HashMap<String, Result<ProtocolState, ProbeError>>,
}

impl LocalStates {
    pub fn insert(
        &mut self,
        repository: impl Into<String>,
        state: Result<ProtocolState, ProbeError>,
    ) {
        self.states.insert(repository.into(), state);
    }

    #[must_use]
    pub fn get(&self, repository: &str) -> Option<&Result<ProtocolState, ProbeError>> {
        self.states.get(repository)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Probe every descriptor exactly once, sequentially.
pub async fn probe_inventory(batch: &InventoryBatch, prober: &dyn LocalStateProber) -> LocalStates {
    let mut states = LocalStates::default();
    for repo in &batch.repositories {
        let state = prober.probe(&repo.local_path).await;
        if let Err(e) = &state {
            tracing::warn!(repository = %repo.name, error = %e, "Cannot determine local state");
        }
        states.insert(repo.name.clone(), state);
    }
    states
}

/// Mismatches between local state and `desired`.
///
/// Only working copies with a classifiable protocol can mismatch: missing
/// copies, unknown remotes and probe failures never do.
#[must_use]
pub fn detect_mismatches(
    batch: &InventoryBatch,
    states: &LocalStates,
    desired: Protocol,
) -> Vec<ProtocolMismatch> {
    batch
        .repositories
        .iter()
        .filter_map(|repo| {
            let current = states.get(&repo.name)?.as_ref().ok()?.as_protocol()?;
            (current != desired).then(|| ProtocolMismatch {
                repository: repo.name.clone(),
                path: repo.local_path.clone(),
                current,
                desired,
            })
        })
        .collect()
}

/// What the engine should do with one repository.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    /// No local copy: clone with this protocol.
    Clone { protocol: Protocol },
    /// Local copy exists: pull through its configured remote. `None` when
    /// that remote's protocol could not be classified.
    Pull { protocol: Option<Protocol> },
    /// The local state could not be determined.
    Unavailable { error: String },
}

#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub repository: RepositoryDescriptor,
    pub action: PlannedAction,
}

/// Output of reconciliation: one planned item per descriptor, in inventory order.
#[derive(Debug, Clone, Default)]
pub struct ProtocolPlan {
    pub items: Vec<PlannedItem>,
    pub mismatches: Vec<ProtocolMismatch>,
    /// Working copies whose remote was rewritten.
    pub switched: usize,
    /// Mismatches left as they are (skip, declined, dry run).
    pub kept: usize,
    /// Switches that were attempted and failed.
    pub failed: usize,
}

enum Resolution {
    Switched,
    Kept,
    Failed(String),
}

/// Resolves mismatches and builds the execution plan.
pub struct Reconciler<'a> {
    pub desired: Protocol,
    pub policy: ResolutionPolicy,
    pub dry_run: bool,
    pub validator: &'a PathValidator,
    pub prompter: &'a dyn SwitchPrompter,
    pub switcher: &'a dyn RemoteSwitcher,
    pub sanitizer: &'a Sanitizer,
}

impl Reconciler<'_> {
    pub async fn reconcile(
        &self,
        batch: &InventoryBatch,
        states: &LocalStates,
        on_progress: Option<&ProgressCallback>,
    ) -> ProtocolPlan {
        let mismatches = detect_mismatches(batch, states, self.desired);
        let mut resolved: HashMap<&str, Protocol> = HashMap::with_capacity(mismatches.len());
        let mut plan = ProtocolPlan::default();

        for mismatch in &mismatches {
            emit(
                on_progress,
                SyncProgress::ProtocolMismatch {
                    repository: mismatch.repository.clone(),
                    current: mismatch.current,
                    desired: mismatch.desired,
                },
            );

            let outcome = self.resolve(batch, mismatch).await;
            let in_use = match outcome {
                Resolution::Switched => {
                    plan.switched += 1;
                    emit(
                        on_progress,
                        SyncProgress::ProtocolSwitched {
                            repository: mismatch.repository.clone(),
                            protocol: mismatch.desired,
                        },
                    );
                    mismatch.desired
                }
                Resolution::Kept => {
                    plan.kept += 1;
                    emit(
                        on_progress,
                        SyncProgress::ProtocolSwitchDeclined {
                            repository: mismatch.repository.clone(),
                            kept: mismatch.current,
                        },
                    );
                    mismatch.current
                }
                Resolution::Failed(error) => {
                    plan.failed += 1;
                    tracing::warn!(
                        repository = %mismatch.repository,
                        error = %error,
                        "Protocol switch failed, keeping existing remote"
                    );
                    emit(
                        on_progress,
                        SyncProgress::ProtocolSwitchFailed {
                            repository: mismatch.repository.clone(),
                            error,
                        },
                    );
                    mismatch.current
                }
            };
            resolved.insert(mismatch.repository.as_str(), in_use);
        }

        plan.items = batch
            .repositories
            .iter()
            .map(|repo| {
                let action = match states.get(&repo.name) {
                    None => PlannedAction::Unavailable {
                        error: "local state was not probed".to_string(),
                    },
                    Some(Err(e)) => PlannedAction::Unavailable {
                        error: self.sanitizer.sanitize(&e.to_string()),
                    },
                    Some(Ok(ProtocolState::NoneLocal)) => PlannedAction::Clone {
                        protocol: self.desired,
                    },
                    Some(Ok(state)) => PlannedAction::Pull {
                        protocol: resolved
                            .get(repo.name.as_str())
                            .copied()
                            .or_else(|| state.as_protocol()),
                    },
                };
                PlannedItem {
                    repository: repo.clone(),
                    action,
                }
            })
            .collect();
        plan.mismatches = mismatches;
        plan
    }

    async fn resolve(&self, batch: &InventoryBatch, mismatch: &ProtocolMismatch) -> Resolution {
        let wants_switch = match self.policy {
            ResolutionPolicy::Skip => false,
            ResolutionPolicy::Automatic => true,
            ResolutionPolicy::Interactive => {
                !self.dry_run && self.prompter.confirm_switch(mismatch)
            }
        };
        if !wants_switch {
            return Resolution::Kept;
        }
        if self.dry_run {
            tracing::info!(
                repository = %mismatch.repository,
                from = %mismatch.current,
                to = %mismatch.desired,
                "Dry run: would switch protocol"
            );
            return Resolution::Kept;
        }

        let Some(repo) = batch
            .repositories
            .iter()
            .find(|r| r.name == mismatch.repository)
        else {
            return Resolution::Failed("repository not in inventory".to_string());
        };
        let url = repo.url_for(mismatch.desired);

        let checked = self
            .validator
            .validate(&mismatch.path)
            .and_then(|path| PathValidator::validate_remote_url(url).map(|()| path));
        let path = match checked {
            Ok(path) => path,
            Err(e) => return Resolution::Failed(e.to_string()),
        };

        match self.switcher.switch(path.as_path(), url).await {
            Ok(()) => {
                tracing::info!(
                    repository = %mismatch.repository,
                    protocol = %mismatch.desired,
                    "Switched remote protocol"
                );
                Resolution::Switched
            }
            Err(e) => Resolution::Failed(self.sanitizer.sanitize(&e.to_string())),
        }
    }
}
