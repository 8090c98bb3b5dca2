use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::cancel::CancellationFlag;
use super::engine::Engine;
use super::filter::RepoFilter;
use super::hooks::BatchHook;
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{BatchResult, EngineOptions, ErrorKind, MAX_WORKERS};
use crate::credentials::{NoToken, TokenProvider};
use crate::git::{GitOperations, GitProber, LocalStateProber, Protocol, RemoteSwitcher};
use crate::reconcile::{
    DeclineAll, ProtocolMismatch, Reconciler, ResolutionPolicy, SwitchPrompter, probe_inventory,
};
use crate::remote::{InventoryClient, InventoryRequest, RemoteError};
use crate::validate::{PathValidationError, PathValidator, Sanitizer};

/// The batch could not start. Nothing was cloned or pulled.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Path(#[from] PathValidationError),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

impl SyncError {
    /// Taxonomy kind, where one applies.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Remote(e) => Some(e.kind()),
            Self::Path(_) => Some(ErrorKind::PathValidationError),
            Self::InvalidOptions(_) => None,
        }
    }
}

/// Everything one `BatchSync::run` needs to know.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub inventory: InventoryRequest,
    pub workspace_root: PathBuf,
    pub filter: RepoFilter,
    pub protocol: Protocol,
    pub policy: ResolutionPolicy,
    pub engine: EngineOptions,
}

impl SyncRequest {
    pub fn new(inventory: InventoryRequest, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            inventory,
            workspace_root: workspace_root.into(),
            filter: RepoFilter::default(),
            protocol: Protocol::default(),
            policy: ResolutionPolicy::default(),
            engine: EngineOptions::default(),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub entity: String,
    /// Repositories in the fetched inventory.
    pub fetched: usize,
    /// Repositories left after filtering.
    pub selected: usize,
    #[serde(skip)]
    pub mismatches: Vec<ProtocolMismatch>,
    /// Working copies whose protocol was switched.
    pub switched: usize,
    pub result: BatchResult,
}

/// Fetch, filter, probe, reconcile and execute.
///
/// The first four steps form a sequential prelude; any error there is a
/// [`SyncError`]. The execution phase never fails as a whole.
pub struct BatchSync {
    client: Arc<dyn InventoryClient>,
    git: GitOperations,
    prober: Arc<dyn LocalStateProber>,
    switcher: Arc<dyn RemoteSwitcher>,
    tokens: Arc<dyn TokenProvider>,
    prompter: Arc<dyn SwitchPrompter>,
    hooks: Vec<Arc<dyn BatchHook>>,
    cancel: CancellationFlag,
}

impl BatchSync {
    pub fn new(client: Arc<dyn InventoryClient>, git: GitOperations) -> Self {
        Self {
            client,
            prober: Arc::new(GitProber::new(git.clone())),
            switcher: Arc::new(git.clone()),
            git,
            tokens: Arc::new(NoToken),
            prompter: Arc::new(DeclineAll),
            hooks: Vec::new(),
            cancel: CancellationFlag::new(),
        }
    }

    #[must_use]
    pub fn with_prober(mut self, prober: Arc<dyn LocalStateProber>) -> Self {
        self.prober = prober;
        self
    }

    #[must_use]
    pub fn with_switcher(mut self, switcher: Arc<dyn RemoteSwitcher>) -> Self {
        self.switcher = switcher;
        self
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }

    #[must_use]
    pub fn with_prompter(mut self, prompter: Arc<dyn SwitchPrompter>) -> Self {
        self.prompter = prompter;
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn BatchHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that stops dispatch of new work when set.
    #[must_use]
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    fn check_options(request: &SyncRequest) -> Result<PathValidator, SyncError> {
        PathValidator::validate_name(&request.inventory.entity_name)?;
        if request.engine.operation_timeout.is_zero() {
            return Err(SyncError::InvalidOptions(
                "operation timeout must be greater than zero".to_string(),
            ));
        }
        if request.engine.max_workers == 0 {
            return Err(SyncError::InvalidOptions(
                "max workers must be at least 1".to_string(),
            ));
        }
        Ok(PathValidator::new(&request.workspace_root)?)
    }

    /// Run one batch.
    ///
    /// # Errors
    ///
    /// [`SyncError`] when the options are invalid or the inventory cannot be
    /// fetched. Per-repository failures are in the returned report.
    pub async fn run(
        &self,
        request: &SyncRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<SyncReport, SyncError> {
        let validator = Self::check_options(request)?;
        let entity = request.inventory.entity_name.clone();
        if request.engine.max_workers > MAX_WORKERS {
            emit(
                on_progress,
                SyncProgress::Warning {
                    message: format!(
                        "max workers capped at {MAX_WORKERS} (requested {})",
                        request.engine.max_workers
                    ),
                },
            );
        }

        let inventory = self
            .client
            .fetch_inventory(&request.inventory, on_progress)
            .await?;

        for name in request.filter.unknown_names(&inventory) {
            let message = format!("repository '{name}' not found in {entity}'s inventory");
            tracing::warn!(
                repository = name,
                entity = %entity,
                "Requested repository not in inventory"
            );
            emit(on_progress, SyncProgress::Warning { message });
        }

        let selected = request.filter.apply(&inventory);
        tracing::info!(
            entity = %entity,
            selected = selected.total_count(),
            total = inventory.total_count(),
            "Filtered inventory"
        );
        emit(
            on_progress,
            SyncProgress::FilterComplete {
                entity: entity.clone(),
                selected: selected.total_count(),
                total: inventory.total_count(),
            },
        );

        let sanitizer = match self.tokens.token() {
            Ok(Some(token)) => Sanitizer::new().with_secret(token.expose()),
            _ => Sanitizer::new(),
        };

        let states = probe_inventory(&selected, self.prober.as_ref()).await;
        let reconciler = Reconciler {
            desired: request.protocol,
            policy: request.policy,
            dry_run: request.engine.dry_run,
            validator: &validator,
            prompter: self.prompter.as_ref(),
            switcher: self.switcher.as_ref(),
            sanitizer: &sanitizer,
        };
        let plan = reconciler.reconcile(&selected, &states, on_progress).await;

        let engine = Engine::new(self.git.clone(), validator.clone())
            .with_options(request.engine.clone())
            .with_tokens(Arc::clone(&self.tokens))
            .with_sanitizer(sanitizer)
            .with_hooks(self.hooks.clone())
            .with_cancellation(self.cancel.clone());
        let result = engine.process_batch(plan.items, on_progress).await;

        Ok(SyncReport {
            entity,
            fetched: inventory.total_count(),
            selected: selected.total_count(),
            mismatches: plan.mismatches,
            switched: plan.switched,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::git::process::testing::ScriptedExecutor;
    use crate::remote::{EntityType, InventoryBatch, Visibility, descriptor};
    use crate::sync::OperationAction;

    struct FixedInventory(Result<Vec<&'static str>, fn() -> RemoteError>);

    #[async_trait]
    impl InventoryClient for FixedInventory {
        async fn fetch_inventory(
            &self,
            request: &InventoryRequest,
            _on_progress: Option<&ProgressCallback>,
        ) -> Result<InventoryBatch, RemoteError> {
            let names = self.0.as_ref().map_err(|make| make())?;
            let root = Path::new("/work");
            Ok(InventoryBatch::new(
                request.entity_type,
                request.entity_name.clone(),
                Utc::now(),
                names.iter().map(|n| descriptor(n, root)).collect(),
            ))
        }
    }

    fn request(dry_run: bool) -> SyncRequest {
        let mut request = SyncRequest::new(
            InventoryRequest::new(EntityType::Org, "acme", Visibility::All),
            "/work",
        );
        request.engine.dry_run = dry_run;
        request
    }

    fn sync(client: FixedInventory, executor: &Arc<ScriptedExecutor>) -> BatchSync {
        BatchSync::new(Arc::new(client), GitOperations::new(executor.clone()))
    }

    #[tokio::test]
    async fn dry_run_plans_clones_for_missing_copies() {
        let executor = Arc::new(ScriptedExecutor::succeeding());
        let sync = sync(FixedInventory(Ok(vec!["api", "web"])), &executor);

        let report = sync.run(&request(true), None).await.unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.selected, 2);
        assert!(report.mismatches.is_empty());
        assert!(
            report
                .result
                .outcomes
                .iter()
                .all(|o| o.action == OperationAction::WouldClone)
        );
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_means_batch_could_not_start() {
        let executor = Arc::new(ScriptedExecutor::succeeding());
        let sync = sync(
            FixedInventory(Err(|| RemoteError::not_found("orgs/acme"))),
            &executor,
        );

        let err = sync.run(&request(false), None).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::RemoteNotFoundError));
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_before_fetching() {
        let executor = Arc::new(ScriptedExecutor::succeeding());
        let sync = sync(FixedInventory(Ok(vec!["api"])), &executor);

        let mut bad_workers = request(true);
        bad_workers.engine.max_workers = 0;
        assert!(matches!(
            sync.run(&bad_workers, None).await,
            Err(SyncError::InvalidOptions(_))
        ));

        let mut relative = request(true);
        relative.workspace_root = PathBuf::from("relative");
        assert!(matches!(
            sync.run(&relative, None).await,
            Err(SyncError::Path(PathValidationError::RelativeRoot(_)))
        ));

        let mut bad_entity = request(true);
        bad_entity.inventory.entity_name = "../etc".to_string();
        assert!(matches!(sync.run(&bad_entity, None).await, Err(SyncError::Path(_))));
    }

    #[tokio::test]
    async fn unknown_requested_names_produce_warnings() {
        let executor = Arc::new(ScriptedExecutor::succeeding());
        let sync = sync(FixedInventory(Ok(vec!["api", "web"])), &executor);
        let mut request = request(true);
        request.filter.names = vec!["api".into(), "ghost".into()];

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |e| sink.lock().unwrap().push(e));

        let report = sync.run(&request, Some(&callback)).await.unwrap();

        assert_eq!(report.selected, 1);
        let events = events.lock().unwrap();
        assert!(events.iter().any(
            |e| matches!(e, SyncProgress::Warning { message } if message.contains("ghost"))
        ));
        assert!(events.iter().any(|e| matches!(
            e,
            SyncProgress::FilterComplete { selected: 1, total: 2, .. }
        )));
    }
}
