//! Batch types and constants shared by the engine, the aggregator and callers.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Hard upper bound on the worker pool size.
pub const MAX_WORKERS: usize = 20;

/// Worker pool size when the caller does not pick one.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default timeout for a single clone or pull invocation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum backoff delay in milliseconds for transient remote errors.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Retries for a transient remote error before it surfaces.
pub const MAX_TRANSIENT_RETRIES: u32 = 3;

/// Error detail kept on an outcome is truncated to this many characters.
pub const MAX_DETAIL_CHARS: usize = 500;

/// Options for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Requested pool size. Clamped to `1..=MAX_WORKERS`.
    pub max_workers: usize,
    /// Timeout for each git invocation.
    pub operation_timeout: Duration,
    /// Record planned actions without running anything.
    pub dry_run: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            dry_run: false,
        }
    }
}

impl EngineOptions {
    /// Number of workers actually spawned for `total` items.
    ///
    /// Never more than `total`, so asking for 20 workers for 3 repositories
    /// behaves exactly like asking for 3.
    #[must_use]
    pub fn worker_count(&self, total: usize) -> usize {
        self.max_workers.clamp(1, MAX_WORKERS).min(total)
    }
}

/// What happened (or would happen) to one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationAction {
    Cloned,
    Pulled,
    Skipped,
    WouldClone,
    WouldPull,
}

impl OperationAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cloned => "cloned",
            Self::Pulled => "pulled",
            Self::Skipped => "skipped",
            Self::WouldClone => "would-clone",
            Self::WouldPull => "would-pull",
        }
    }
}

impl fmt::Display for OperationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy for anything that can go wrong with a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    RemoteAuthError,
    RemoteNotFoundError,
    RemoteRateLimitedError,
    RemoteTransientError,
    LocalStateError,
    PathValidationError,
    ProcessTimeoutError,
    ProcessExecutionError,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RemoteAuthError => "RemoteAuthError",
            Self::RemoteNotFoundError => "RemoteNotFoundError",
            Self::RemoteRateLimitedError => "RemoteRateLimitedError",
            Self::RemoteTransientError => "RemoteTransientError",
            Self::LocalStateError => "LocalStateError",
            Self::PathValidationError => "PathValidationError",
            Self::ProcessTimeoutError => "ProcessTimeoutError",
            Self::ProcessExecutionError => "ProcessExecutionError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of processing a single repository.
///
/// `detail` is always sanitized before it lands here: no URL userinfo and
/// no token values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub repository: String,
    pub action: OperationAction,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    /// Failure message, or the reason for a skip.
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl OperationOutcome {
    pub fn succeeded(
        repository: impl Into<String>,
        action: OperationAction,
        duration: Duration,
    ) -> Self {
        Self {
            repository: repository.into(),
            action,
            success: true,
            error_kind: None,
            detail: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn skipped(
        repository: impl Into<String>,
        reason: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            repository: repository.into(),
            action: OperationAction::Skipped,
            success: true,
            error_kind: None,
            detail: Some(reason.into()),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failed(
        repository: impl Into<String>,
        action: OperationAction,
        kind: ErrorKind,
        detail: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            repository: repository.into(),
            action,
            success: false,
            error_kind: Some(kind),
            detail: Some(detail.into()),
            duration_ms: duration.as_millis() as u64,
        }
    }

    #[must_use]
    pub fn is_skip(&self) -> bool {
        self.success && self.action == OperationAction::Skipped
    }
}

/// Final aggregate of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// Successful outcomes: clones, pulls, dry-run plans and skips.
    pub processed_count: usize,
    pub failed_count: usize,
    /// Part of `processed_count`: pulls skipped for an empty or dirty working copy.
    pub skipped_count: usize,
    /// Number of repositories handed to the engine.
    pub total_count: usize,
    /// Failed outcomes, sorted by repository name.
    pub failures: Vec<OperationOutcome>,
    /// Every recorded outcome, sorted by repository name.
    pub outcomes: Vec<OperationOutcome>,
    /// True if dispatch stopped early because of a cancellation request.
    pub cancelled: bool,
}

impl BatchResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed_count == 0 && !self.cancelled
    }

    /// Repositories that were never started because the batch was cancelled.
    #[must_use]
    pub fn not_started(&self) -> usize {
        self.total_count
            .saturating_sub(self.processed_count + self.failed_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_options_default() {
        let options = EngineOptions::default();
        assert_eq!(options.max_workers, DEFAULT_MAX_WORKERS);
        assert_eq!(options.operation_timeout, Duration::from_secs(300));
        assert!(!options.dry_run);
    }

    #[test]
    fn worker_count_never_exceeds_total_or_bound() {
        let mut options = EngineOptions {
            max_workers: 50,
            ..Default::default()
        };
        assert_eq!(options.worker_count(100), MAX_WORKERS);
        assert_eq!(options.worker_count(3), 3);

        options.max_workers = 0;
        assert_eq!(options.worker_count(10), 1);
        assert_eq!(options.worker_count(0), 0);
    }

    #[test]
    fn action_strings() {
        assert_eq!(OperationAction::WouldClone.to_string(), "would-clone");
        assert_eq!(OperationAction::Pulled.to_string(), "pulled");
        assert_eq!(ErrorKind::ProcessExecutionError.to_string(), "ProcessExecutionError");
    }

    #[test]
    fn skipped_outcomes_are_successful_skips() {
        let outcome = OperationOutcome::skipped("repo", "uncommitted changes", Duration::ZERO);
        assert!(outcome.is_skip());
        assert!(outcome.error_kind.is_none());

        let cloned =
            OperationOutcome::succeeded("repo", OperationAction::Cloned, Duration::from_millis(12));
        assert!(!cloned.is_skip());
        assert_eq!(cloned.duration_ms, 12);
    }

    #[test]
    fn batch_result_not_started() {
        let result = BatchResult {
            processed_count: 4,
            failed_count: 1,
            skipped_count: 1,
            total_count: 8,
            cancelled: true,
            ..Default::default()
        };
        assert_eq!(result.not_started(), 3);
        assert!(!result.is_success());
    }
}
