//! Progress events for the whole sync pipeline.
//!
//! The library reports everything it does through a single callback. The CLI
//! turns these events into progress bars on a terminal and into structured
//! log lines everywhere else. Emitting is fire-and-forget: the library never
//! waits on the receiver.

use chrono::{DateTime, Utc};

use super::types::{OperationAction, OperationOutcome};
use crate::git::Protocol;

/// Progress events emitted during a sync run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// Starting to fetch the inventory of an entity.
    FetchingRepos {
        /// The user or organization being fetched.
        entity: String,
    },

    /// Fetched one page of the inventory.
    FetchedPage {
        entity: String,
        /// Page number (1-indexed).
        page: u32,
        /// Repositories on this page.
        count: usize,
        /// Running total across pages.
        total_so_far: usize,
    },

    /// Inventory fetch finished.
    FetchComplete { entity: String, total: usize },

    /// Inventory was served from the local cache.
    CacheHit { entity: String, cached_count: usize },

    /// Waiting for the remote quota to reset before the next request.
    RateLimitWait {
        /// How long the client will sleep.
        wait_ms: u64,
        /// When the remote says the quota resets.
        reset_at: DateTime<Utc>,
    },

    /// A transient remote failure is being retried.
    RequestRetry {
        /// Short description of the request (usually the path).
        target: String,
        retry_after_ms: u64,
        attempt: u32,
    },

    /// Filtering narrowed the inventory down to the repositories to sync.
    FilterComplete {
        entity: String,
        selected: usize,
        total: usize,
    },

    /// A working copy uses a different protocol than requested.
    ProtocolMismatch {
        repository: String,
        current: Protocol,
        desired: Protocol,
    },

    /// The origin remote of a working copy was rewritten.
    ProtocolSwitched { repository: String, protocol: Protocol },

    /// The switch was declined or skipped; the working copy keeps its protocol.
    ProtocolSwitchDeclined { repository: String, kept: Protocol },

    /// Rewriting the origin remote failed; the old protocol stays in use.
    ProtocolSwitchFailed { repository: String, error: String },

    /// The execution engine is starting.
    BatchStarted {
        total: usize,
        workers: usize,
        dry_run: bool,
    },

    /// A worker picked up a repository.
    RepositoryStarted {
        repository: String,
        action: OperationAction,
    },

    /// A repository finished (successfully or not).
    RepositoryCompleted { outcome: OperationOutcome },

    /// The execution engine finished or was cancelled.
    BatchFinished {
        processed: usize,
        failed: usize,
        skipped: usize,
        total: usize,
        cancelled: bool,
    },

    /// Non-fatal warning.
    Warning { message: String },
}

/// Callback type for progress reporting.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(callback: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = callback {
        cb(event);
    }
}
