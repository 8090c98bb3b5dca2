use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gitbatch::cache::{CachedInventoryClient, FileInventoryCache};
use gitbatch::git::{GitOperations, TokioProcessExecutor};
use gitbatch::github::GitHubClient;
use gitbatch::http::ReqwestTransport;
use gitbatch::remote::{QuotaRateLimiter, RateLimitPolicy, SystemClock};
use gitbatch::sync::{EngineOptions, RepoFilter, SyncRequest};
use gitbatch::{
    BatchSync, CancellationFlag, EntityType, InventoryClient, InventoryRequest, NoToken,
    Protocol, ResolutionPolicy, StaticTokenProvider, SyncReport, TokenProvider, Visibility,
};
use tabled::Tabled;

use crate::config::{Config, ConfigError};
use crate::progress::ProgressReporter;
use crate::prompt::ConsolePrompter;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for `gitbatch sync`. Anything left unset falls back to the config.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SyncArgs {
    /// Kind of account: user or org
    pub entity_type: EntityType,

    /// User or organization name
    pub name: String,

    /// Clone over SSH and switch existing HTTPS working copies
    #[arg(long, conflicts_with = "https")]
    pub ssh: bool,

    /// Clone over HTTPS and switch existing SSH working copies
    #[arg(long)]
    pub https: bool,

    /// What to do with working copies on the other protocol: interactive, automatic or skip
    #[arg(long)]
    pub policy: Option<ResolutionPolicy>,

    /// Dry run - show what would be done without cloning or pulling
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Maximum parallel clones/pulls (default from config or 4, at most 20)
    #[arg(short = 'w', long)]
    pub max_workers: Option<usize>,

    /// Timeout for a single clone or pull, in seconds (default from config or 300)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Only these repositories (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub repos: Vec<String>,

    /// Repository visibility: all, public or private
    #[arg(long)]
    pub visibility: Option<Visibility>,

    /// Include archived repositories
    #[arg(long)]
    pub include_archived: bool,

    /// Leave out forks
    #[arg(long)]
    pub exclude_forks: bool,

    /// Ignore the cached inventory and fetch it again
    #[arg(long)]
    pub refresh: bool,

    /// Do not read or write the inventory cache
    #[arg(long)]
    pub no_cache: bool,

    /// Workspace root; working copies go to <folder>/<name>/<repo>
    #[arg(short = 'f', long)]
    pub local_folder: Option<PathBuf>,

    /// Disable proactive rate limiting (may cause API throttling)
    #[arg(short = 'R', long)]
    pub no_rate_limit: bool,

    /// GitHub token (overrides config)
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl SyncArgs {
    /// Layer the flags over the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(folder) = &self.local_folder {
            config.sync.local_folder = Some(folder.clone());
        }
        if let Some(token) = &self.token {
            config.github.token = Some(token.clone());
        }
        if self.ssh {
            config.sync.protocol = Protocol::Ssh;
        } else if self.https {
            config.sync.protocol = Protocol::Https;
        }
        if let Some(policy) = self.policy {
            config.sync.protocol_policy = policy;
        }
        if let Some(workers) = self.max_workers {
            config.sync.max_workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.sync.timeout_secs = timeout;
        }
        if let Some(visibility) = self.visibility {
            config.sync.visibility = visibility;
        }
        if self.include_archived {
            config.sync.exclude_archived = false;
        }
        if self.exclude_forks {
            config.sync.exclude_forks = true;
        }
        if self.no_rate_limit {
            config.sync.no_rate_limit = true;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
    }

    fn request(&self, config: &Config, root: PathBuf) -> SyncRequest {
        let visibility = config.sync.visibility;
        SyncRequest {
            inventory: InventoryRequest::new(self.entity_type, &self.name, visibility),
            workspace_root: root,
            filter: RepoFilter {
                names: self.repos.clone(),
                visibility,
                exclude_archived: config.sync.exclude_archived,
                exclude_forks: config.sync.exclude_forks,
            },
            protocol: config.sync.protocol,
            policy: config.sync.protocol_policy,
            engine: EngineOptions {
                max_workers: config.sync.max_workers,
                operation_timeout: config.operation_timeout(),
                dry_run: self.dry_run,
            },
        }
    }
}

/// Run one sync. Returns `Ok(false)` when the batch could not start or any
/// repository failed.
pub(crate) async fn handle_sync(
    args: SyncArgs,
    mut config: Config,
    cancel: CancellationFlag,
) -> Result<bool, Box<dyn std::error::Error>> {
    args.apply(&mut config);
    config.validate()?;
    let root = config
        .sync
        .local_folder
        .clone()
        .ok_or(ConfigError::MissingLocalFolder)?;

    let tokens: Arc<dyn TokenProvider> = match config.github_token() {
        Some(token) => Arc::new(StaticTokenProvider::new(token)),
        None => {
            tracing::info!("No GitHub token configured, only public repositories are visible");
            Arc::new(NoToken)
        }
    };

    let mut policy = RateLimitPolicy::default();
    if config.sync.no_rate_limit {
        policy = policy.without_pacing();
    }
    let limiter = Arc::new(QuotaRateLimiter::new(policy, Arc::new(SystemClock)));
    let transport = Arc::new(ReqwestTransport::with_timeout(HTTP_TIMEOUT)?);
    let github = GitHubClient::new(transport, Arc::clone(&tokens), limiter, &root)
        .with_api_base(config.github.api_url.as_str());

    let client: Arc<dyn InventoryClient> = match config.cache_dir() {
        Some(dir) if config.cache.enabled => {
            tracing::debug!("Inventory cache at {}", dir.display());
            let cache = Arc::new(FileInventoryCache::new(dir, config.cache_ttl()));
            Arc::new(CachedInventoryClient::new(github, cache, &root).refresh(args.refresh))
        }
        _ => Arc::new(github),
    };

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let git = GitOperations::new(Arc::new(TokioProcessExecutor));
    let sync = BatchSync::new(client, git)
        .with_tokens(tokens)
        .with_prompter(Arc::new(ConsolePrompter::new(Arc::clone(&reporter))))
        .with_cancellation(cancel);

    let request = args.request(&config, root);
    let outcome = sync.run(&request, Some(callback.as_ref())).await;
    reporter.finish();

    match outcome {
        Ok(report) => {
            println!("{}", render_report(&report, args.dry_run));
            Ok(report.result.is_success())
        }
        Err(e) => {
            tracing::error!(error_kind = ?e.kind(), "Batch could not start: {}", e);
            eprintln!("Batch could not start: {}", e);
            Ok(false)
        }
    }
}

#[derive(Debug, Clone, Tabled)]
struct FailureRow {
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Error")]
    kind: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Final summary printed after a run.
fn render_report(report: &SyncReport, dry_run: bool) -> String {
    let result = &report.result;
    let mut lines = Vec::new();

    if dry_run {
        lines.push("Dry run: nothing was cloned or pulled.".to_string());
    }
    if result.failed_count == 0 {
        lines.push(format!(
            "Synced {} of {} repositories from {}",
            result.processed_count,
            result.total_count,
            report.entity
        ));
    } else {
        lines.push(format!(
            "{} of {} repositories failed",
            result.failed_count, result.total_count
        ));
    }
    if result.skipped_count > 0 {
        lines.push(format!(
            "{} of them skipped (empty or with uncommitted changes)",
            result.skipped_count
        ));
    }
    if report.switched > 0 {
        lines.push(format!("{} working copies switched protocol", report.switched));
    }
    if result.cancelled {
        lines.push(format!(
            "Cancelled: {} repositories were not started",
            result.not_started()
        ));
    }

    if !result.failures.is_empty() {
        let rows: Vec<FailureRow> = result
            .failures
            .iter()
            .map(|o| FailureRow {
                repository: o.repository.clone(),
                kind: o.error_kind.map(|k| k.to_string()).unwrap_or_default(),
                detail: o.detail.clone().unwrap_or_default(),
            })
            .collect();
        let mut table = tabled::Table::new(rows);
        table.with(tabled::settings::Style::rounded());
        lines.push(table.to_string());
    }

    lines.join("\n")
}
