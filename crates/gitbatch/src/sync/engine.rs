//! Bounded-concurrency execution engine.
//!
//! A fixed pool of `min(max_workers, total)` tokio tasks drains a shared
//! queue of planned items. Each worker runs one clone or pull to completion
//! before taking the next item. A failure is always contained to the
//! repository's own outcome; nothing a single repository does can abort the
//! batch.
//!
//! # Example
//!
//! ```ignore
//! use gitbatch::sync::engine::Engine;
//!
//! let engine = Engine::new(git, validator).with_options(options);
//! let result = engine.process_batch(plan.items, Some(&progress)).await;
//! println!("{} failed", result.failed_count);
//! ```

pub mod aggregator;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::cancel::CancellationFlag;
use super::hooks::BatchHook;
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{BatchResult, EngineOptions, ErrorKind, OperationAction, OperationOutcome};
use crate::credentials::{NoToken, Token, TokenProvider};
use crate::git::{GitOperations, Protocol, PullResult};
use crate::reconcile::{PlannedAction, PlannedItem};
use crate::remote::RepositoryDescriptor;
use crate::validate::{PathValidationError, PathValidator, SafePath, Sanitizer};

pub use aggregator::BatchAggregator;

/// Why a single repository failed.
struct Failure {
    kind: ErrorKind,
    detail: String,
}

impl Failure {
    fn new(kind: ErrorKind, detail: impl ToString) -> Self {
        Self {
            kind,
            detail: detail.to_string(),
        }
    }
}

impl From<PathValidationError> for Failure {
    fn from(err: PathValidationError) -> Self {
        Self::new(ErrorKind::PathValidationError, err)
    }
}

enum Done {
    Succeeded(OperationAction),
    Skipped(&'static str),
}

/// Runs planned clone and pull operations on a bounded worker pool.
#[derive(Clone)]
pub struct Engine {
    git: GitOperations,
    validator: PathValidator,
    options: EngineOptions,
    tokens: Arc<dyn TokenProvider>,
    sanitizer: Sanitizer,
    hooks: Vec<Arc<dyn BatchHook>>,
    cancel: CancellationFlag,
}

impl Engine {
    pub fn new(git: GitOperations, validator: PathValidator) -> Self {
        let options = EngineOptions::default();
        Self {
            git: git.with_timeout(options.operation_timeout),
            validator,
            options,
            tokens: Arc::new(NoToken),
            sanitizer: Sanitizer::new(),
            hooks: Vec::new(),
            cancel: CancellationFlag::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.git = self.git.with_timeout(options.operation_timeout);
        self.options = options;
        self
    }

    /// Token used for private HTTPS clones.
    #[must_use]
    pub fn with_tokens(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }

    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn BatchHook>>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Process every planned item and aggregate the outcomes.
    ///
    /// Never fails: per-repository errors end up in the result. After a
    /// cancellation the result covers whatever had completed.
    pub async fn process_batch(
        &self,
        items: Vec<PlannedItem>,
        on_progress: Option<&ProgressCallback>,
    ) -> BatchResult {
        let total = items.len();
        let workers = self.options.worker_count(total);
        let dry_run = self.options.dry_run;

        let aggregator = Arc::new(BatchAggregator::new(total, self.hooks.clone()));
        let queue = Arc::new(Mutex::new(VecDeque::from(items)));

        tracing::info!(total, workers, dry_run, "Starting batch");
        emit(
            on_progress,
            SyncProgress::BatchStarted {
                total,
                workers,
                dry_run,
            },
        );
        aggregator.start(dry_run);

        // Workers cannot borrow the callback, so their events are funneled
        // back to this task and emitted from here.
        let (tx, mut rx) = mpsc::unbounded_channel::<SyncProgress>();
        let engine = Arc::new(self.clone());
        let mut set = JoinSet::new();
        for worker in 0..workers {
            let engine = Arc::clone(&engine);
            let queue = Arc::clone(&queue);
            let aggregator = Arc::clone(&aggregator);
            let tx = tx.clone();
            set.spawn(async move { engine.worker(worker, queue, aggregator, tx).await });
        }
        drop(tx);

        while let Some(event) = rx.recv().await {
            emit(on_progress, event);
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker task failed");
            }
        }

        let cancelled = !queue.lock().unwrap_or_else(|e| e.into_inner()).is_empty();
        let result = aggregator.finalize(cancelled);

        tracing::info!(
            processed = result.processed_count,
            failed = result.failed_count,
            skipped = result.skipped_count,
            total = result.total_count,
            cancelled,
            "Batch finished"
        );
        emit(
            on_progress,
            SyncProgress::BatchFinished {
                processed: result.processed_count,
                failed: result.failed_count,
                skipped: result.skipped_count,
                total: result.total_count,
                cancelled,
            },
        );
        result
    }

    async fn worker(
        &self,
        worker: usize,
        queue: Arc<Mutex<VecDeque<PlannedItem>>>,
        aggregator: Arc<BatchAggregator>,
        tx: mpsc::UnboundedSender<SyncProgress>,
    ) {
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(worker, "Cancellation requested, worker stopping");
                break;
            }
            let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
            let Some(item) = next else {
                break;
            };

            let outcome = self.run_item(item, &tx).await;
            if outcome.success {
                tracing::debug!(
                    repository = %outcome.repository,
                    action = %outcome.action,
                    duration_ms = outcome.duration_ms,
                    "Repository done"
                );
            } else {
                tracing::warn!(
                    repository = %outcome.repository,
                    error_kind = ?outcome.error_kind,
                    detail = outcome.detail.as_deref().unwrap_or_default(),
                    "Repository failed"
                );
            }
            let _ = tx.send(SyncProgress::RepositoryCompleted {
                outcome: outcome.clone(),
            });
            aggregator.record(outcome);
        }
    }

    async fn run_item(
        &self,
        item: PlannedItem,
        tx: &mpsc::UnboundedSender<SyncProgress>,
    ) -> OperationOutcome {
        let started = Instant::now();
        let repo = &item.repository;
        let action = planned_action(&item.action, self.options.dry_run);
        let _ = tx.send(SyncProgress::RepositoryStarted {
            repository: repo.name.clone(),
            action,
        });

        if self.options.dry_run {
            return self.plan_only(repo, &item.action, action, started, tx);
        }

        match self.execute(repo, &item.action).await {
            Ok(Done::Succeeded(done)) => {
                OperationOutcome::succeeded(&repo.name, done, started.elapsed())
            }
            Ok(Done::Skipped(reason)) => {
                OperationOutcome::skipped(&repo.name, reason, started.elapsed())
            }
            Err(failure) => OperationOutcome::failed(
                &repo.name,
                action,
                failure.kind,
                self.sanitizer.sanitize(&failure.detail),
                started.elapsed(),
            ),
        }
    }

    /// Dry run: check what can be checked without running anything.
    ///
    /// The outcome is always successful; anything that would fail is noted in
    /// the detail and reported as a warning.
    fn plan_only(
        &self,
        repo: &RepositoryDescriptor,
        planned: &PlannedAction,
        action: OperationAction,
        started: Instant,
        tx: &mpsc::UnboundedSender<SyncProgress>,
    ) -> OperationOutcome {
        let problem = match planned {
            PlannedAction::Unavailable { error } => Some(error.clone()),
            PlannedAction::Clone { protocol } => self
                .validator
                .validate(&repo.local_path)
                .and_then(|_| PathValidator::validate_remote_url(repo.url_for(*protocol)))
                .err()
                .map(|e| e.to_string()),
            PlannedAction::Pull { .. } => self
                .validator
                .validate(&repo.local_path)
                .err()
                .map(|e| e.to_string()),
        };

        let mut outcome = OperationOutcome::succeeded(&repo.name, action, started.elapsed());
        if let Some(problem) = problem {
            let problem = self.sanitizer.sanitize(&problem);
            let _ = tx.send(SyncProgress::Warning {
                message: format!("{}: {problem}", repo.name),
            });
            outcome.detail = Some(format!("would fail: {problem}"));
        }
        outcome
    }

    async fn execute(
        &self,
        repo: &RepositoryDescriptor,
        planned: &PlannedAction,
    ) -> Result<Done, Failure> {
        match planned {
            PlannedAction::Unavailable { error } => {
                Err(Failure::new(ErrorKind::LocalStateError, error))
            }
            PlannedAction::Clone { protocol } => {
                let path = self.validator.validate(&repo.local_path)?;
                self.clone_repo(repo, *protocol, &path).await?;
                Ok(Done::Succeeded(OperationAction::Cloned))
            }
            PlannedAction::Pull { .. } => {
                let path = self.validator.validate(&repo.local_path)?;
                if let Some(branch) = &repo.default_branch {
                    PathValidator::validate_branch(branch)?;
                }
                match self
                    .git
                    .pull(path.as_path(), repo.default_branch.as_deref())
                    .await
                {
                    Ok(PullResult::Pulled) => Ok(Done::Succeeded(OperationAction::Pulled)),
                    Ok(skipped) => Ok(Done::Skipped(skipped.skip_reason().unwrap_or("skipped"))),
                    Err(e) => Err(Failure::new(e.kind(), e)),
                }
            }
        }
    }

    /// Clone through `url_for(protocol)`.
    ///
    /// Private HTTPS repositories are cloned through a URL carrying the
    /// token; `origin` is reset to the clean URL as soon as the clone exits.
    async fn clone_repo(
        &self,
        repo: &RepositoryDescriptor,
        protocol: Protocol,
        path: &SafePath,
    ) -> Result<(), Failure> {
        let url = repo.url_for(protocol);
        PathValidator::validate_remote_url(url)?;

        let token = if protocol == Protocol::Https && repo.is_private {
            self.tokens
                .token()
                .map_err(|e| Failure::new(ErrorKind::RemoteAuthError, e))?
        } else {
            None
        };

        let Some(token) = token else {
            return self
                .git
                .clone_repo(url, path.as_path())
                .await
                .map_err(|e| Failure::new(e.kind(), e));
        };

        let sanitizer = self.sanitizer.clone().with_secret(token.expose());
        let cloned = self
            .git
            .clone_repo(&authenticated_url(url, &token), path.as_path())
            .await;

        if (cloned.is_ok() || has_git_dir(path.as_path()).await)
            && let Err(e) = self.git.set_remote_url(path.as_path(), url).await
        {
            return Err(Failure::new(
                e.kind(),
                sanitizer.sanitize(&format!("cloned, but resetting origin failed: {e}")),
            ));
        }
        cloned.map_err(|e| Failure::new(e.kind(), sanitizer.sanitize(&e.to_string())))
    }
}

fn planned_action(planned: &PlannedAction, dry_run: bool) -> OperationAction {
    match (planned, dry_run) {
        (PlannedAction::Clone { .. }, true) => OperationAction::WouldClone,
        (PlannedAction::Clone { .. }, false) => OperationAction::Cloned,
        (_, true) => OperationAction::WouldPull,
        (_, false) => OperationAction::Pulled,
    }
}

/// `https://host/...` with the token as userinfo.
fn authenticated_url(url: &str, token: &Token) -> String {
    match url.strip_prefix("https://") {
        Some(rest) => format!("https://x-access-token:{}@{rest}", token.expose()),
        None => url.to_string(),
    }
}

async fn has_git_dir(path: &Path) -> bool {
    tokio::fs::try_exists(path.join(".git")).await.unwrap_or(false)
}
