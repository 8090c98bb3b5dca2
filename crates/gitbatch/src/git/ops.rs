use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::process::{ProcessError, ProcessExecutor, ProcessOutput};
use crate::sync::{DEFAULT_OPERATION_TIMEOUT, ErrorKind};

/// Timeout for commands that only touch local metadata.
pub const LOCAL_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

const GIT: &str = "git";

#[derive(Debug, Error)]
pub enum GitError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{}: {message}", path.display())]
    LocalState { path: PathBuf, message: String },
}

impl GitError {
    fn local_state(path: &Path, message: impl Into<String>) -> Self {
        Self::LocalState {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Map onto the batch failure taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Process(ProcessError::Timeout { .. }) => ErrorKind::ProcessTimeoutError,
            Self::Process(_) => ErrorKind::ProcessExecutionError,
            Self::LocalState { .. } => ErrorKind::LocalStateError,
        }
    }
}

/// What a pull actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullResult {
    Pulled,
    /// The repository has no commits yet.
    SkippedEmpty,
    /// The working tree has uncommitted changes.
    SkippedDirty,
}

impl PullResult {
    /// Human-readable skip reason.
    #[must_use]
    pub fn skip_reason(self) -> Option<&'static str> {
        match self {
            Self::Pulled => None,
            Self::SkippedEmpty => Some("empty repository (no commits)"),
            Self::SkippedDirty => Some("uncommitted changes in working tree"),
        }
    }
}

/// Rewrites the `origin` URL of an existing working copy.
#[async_trait]
pub trait RemoteSwitcher: Send + Sync {
    async fn switch(&self, path: &Path, url: &str) -> Result<(), GitError>;
}

/// Clone, pull and remote management on top of a [`ProcessExecutor`].
///
/// Arguments are always passed as a vector; URLs and paths must be
/// validated by the caller beforehand.
#[derive(Clone)]
pub struct GitOperations {
    executor: Arc<dyn ProcessExecutor>,
    timeout: Duration,
}

impl GitOperations {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            executor,
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Timeout for clone, checkout and pull.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run_raw(
        &self,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        tracing::debug!(cwd = %cwd.display(), args = ?args.first(), "Running git");
        self.executor.run(GIT, &args, cwd, timeout).await
    }

    /// Run and require exit code 0.
    async fn run(
        &self,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput, GitError> {
        let output = self.run_raw(args, cwd, timeout).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ProcessError::Execution {
                program: format!("git {}", args.first().copied().unwrap_or_default()),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }
            .into())
        }
    }

    /// `git clone -- <url> <path>`, run from the (created) parent directory.
    pub async fn clone_repo(&self, url: &str, path: &Path) -> Result<(), GitError> {
        let parent = path
            .parent()
            .ok_or_else(|| GitError::local_state(path, "clone target has no parent directory"))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| GitError::local_state(parent, format!("cannot create directory: {e}")))?;

        let target = path.to_string_lossy();
        self.run(&["clone", "--", url, &target], parent, self.timeout)
            .await?;
        Ok(())
    }

    /// Fast-forward the working copy, skipping empty and dirty repositories.
    pub async fn pull(
        &self,
        path: &Path,
        default_branch: Option<&str>,
    ) -> Result<PullResult, GitError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(GitError::local_state(path, "working copy does not exist"));
        }

        let head = self
            .run_raw(&["rev-parse", "HEAD"], path, LOCAL_COMMAND_TIMEOUT)
            .await?;
        if !head.success() {
            return Ok(PullResult::SkippedEmpty);
        }

        let status = self
            .run(&["status", "--porcelain"], path, LOCAL_COMMAND_TIMEOUT)
            .await?;
        if !status.stdout.trim().is_empty() {
            return Ok(PullResult::SkippedDirty);
        }

        match default_branch {
            Some(branch) => {
                self.run(&["checkout", branch], path, self.timeout).await?;
                self.run(&["pull", "--ff-only", "origin", branch], path, self.timeout)
                    .await?;
            }
            None => {
                self.run(&["pull", "--ff-only"], path, self.timeout).await?;
            }
        }
        Ok(PullResult::Pulled)
    }

    /// `git remote set-url origin <url>`.
    pub async fn set_remote_url(&self, path: &Path, url: &str) -> Result<(), GitError> {
        self.run(&["remote", "set-url", "origin", url], path, LOCAL_COMMAND_TIMEOUT)
            .await?;
        Ok(())
    }

    /// URL of `origin`, or `None` if the working copy has no such remote.
    pub async fn remote_url(&self, path: &Path) -> Result<Option<String>, GitError> {
        let output = self
            .run_raw(&["remote", "get-url", "origin"], path, LOCAL_COMMAND_TIMEOUT)
            .await?;
        let url = output.stdout.trim();
        Ok((output.success() && !url.is_empty()).then(|| url.to_string()))
    }
}

#[async_trait]
impl RemoteSwitcher for GitOperations {
    async fn switch(&self, path: &Path, url: &str) -> Result<(), GitError> {
        self.set_remote_url(path, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::process::testing::{ScriptedExecutor, exit, ok};

    fn git(executor: &Arc<ScriptedExecutor>) -> GitOperations {
        GitOperations::new(executor.clone()).with_timeout(Duration::from_secs(42))
    }

    #[tokio::test]
    async fn clone_creates_parent_and_separates_options() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("acme").join("api");
        let executor = Arc::new(ScriptedExecutor::succeeding());

        git(&executor)
            .clone_repo("https://github.com/acme/api.git", &target)
            .await
            .unwrap();

        assert!(dir.path().join("acme").is_dir());
        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            vec![
                "clone".to_string(),
                "--".to_string(),
                "https://github.com/acme/api.git".to_string(),
                target.to_string_lossy().into_owned(),
            ]
        );
        assert_eq!(calls[0].cwd, dir.path().join("acme"));
        assert_eq!(calls[0].timeout, Duration::from_secs(42));
    }

    #[tokio::test]
    async fn clone_failure_maps_to_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(ScriptedExecutor::new(|_, _| {
            exit(128, "fatal: repository not found\n")
        }));

        let err = git(&executor)
            .clone_repo("https://github.com/acme/gone.git", &dir.path().join("gone"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProcessExecutionError);
        assert!(err.to_string().contains("repository not found"));
    }

    #[tokio::test]
    async fn timeout_maps_to_timeout_kind() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(ScriptedExecutor::new(|_, _| {
            Err(ProcessError::Timeout {
                program: "git".into(),
                timeout: Duration::from_secs(42),
            })
        }));

        let err = git(&executor)
            .clone_repo("https://github.com/acme/big.git", &dir.path().join("big"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProcessTimeoutError);
    }

    #[tokio::test]
    async fn pull_runs_checkout_then_ff_only_pull() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(ScriptedExecutor::succeeding());

        let result = git(&executor).pull(dir.path(), Some("main")).await.unwrap();

        assert_eq!(result, PullResult::Pulled);
        assert_eq!(
            executor.commands(),
            vec![
                "rev-parse HEAD",
                "status --porcelain",
                "checkout main",
                "pull --ff-only origin main"
            ]
        );
    }

    #[tokio::test]
    async fn pull_without_branch_uses_plain_pull() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(ScriptedExecutor::succeeding());

        git(&executor).pull(dir.path(), None).await.unwrap();
        assert_eq!(executor.commands().last().unwrap(), "pull --ff-only");
    }

    #[tokio::test]
    async fn pull_skips_empty_repository() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(ScriptedExecutor::new(|args, _| {
            if args[0] == "rev-parse" {
                exit(128, "fatal: ambiguous argument 'HEAD'")
            } else {
                ok("")
            }
        }));

        let result = git(&executor).pull(dir.path(), Some("main")).await.unwrap();
        assert_eq!(result, PullResult::SkippedEmpty);
        assert_eq!(executor.calls().len(), 1);
        assert!(result.skip_reason().is_some());
    }

    #[tokio::test]
    async fn pull_skips_dirty_working_tree() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(ScriptedExecutor::new(|args, _| match args[0].as_str() {
            "status" => ok(" M src/lib.rs\n"),
            _ => ok("abc123\n"),
        }));

        let result = git(&executor).pull(dir.path(), Some("main")).await.unwrap();
        assert_eq!(result, PullResult::SkippedDirty);
        assert_eq!(executor.commands(), vec!["rev-parse HEAD", "status --porcelain"]);
    }

    #[tokio::test]
    async fn pull_of_missing_path_is_local_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(ScriptedExecutor::succeeding());

        let err = git(&executor)
            .pull(&dir.path().join("missing"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalStateError);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn remote_url_reads_origin() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(ScriptedExecutor::new(|args, _| {
            if args == ["remote", "get-url", "origin"] {
                ok("git@github.com:acme/api.git\n")
            } else {
                exit(1, "")
            }
        }));

        let url = git(&executor).remote_url(dir.path()).await.unwrap();
        assert_eq!(url.as_deref(), Some("git@github.com:acme/api.git"));
        assert_eq!(executor.calls()[0].timeout, LOCAL_COMMAND_TIMEOUT);
    }

    #[tokio::test]
    async fn missing_origin_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(ScriptedExecutor::new(|_, _| {
            exit(2, "error: No such remote 'origin'")
        }));

        assert_eq!(git(&executor).remote_url(dir.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn switch_sets_origin_url() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(ScriptedExecutor::succeeding());

        git(&executor)
            .switch(dir.path(), "git@github.com:acme/api.git")
            .await
            .unwrap();
        assert_eq!(
            executor.commands(),
            vec!["remote set-url origin git@github.com:acme/api.git"]
        );
    }
}
