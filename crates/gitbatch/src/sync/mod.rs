//! Batch synchronization.
//!
//! # Module Structure
//!
//! - [`types`] - `EngineOptions`, `OperationOutcome`, `BatchResult`, `ErrorKind`, constants
//! - [`progress`] - progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`filter`] - `RepoFilter`
//! - [`engine`] - the worker pool and its `BatchAggregator`
//! - [`hooks`] - `BatchHook` lifecycle callbacks
//!
//! # Example
//!
//! ```ignore
//! use gitbatch::sync::{BatchSync, SyncRequest};
//!
//! let sync = BatchSync::new(client, git).with_tokens(tokens);
//! let report = sync.run(&request, Some(&progress)).await?;
//! println!("{} of {} failed", report.result.failed_count, report.result.total_count);
//! ```

mod batch;
mod cancel;
pub mod engine;
pub mod filter;
pub mod hooks;
mod progress;
mod types;

pub use batch::{BatchSync, SyncError, SyncReport, SyncRequest};
pub use cancel::CancellationFlag;
pub use engine::{BatchAggregator, Engine};
pub use filter::RepoFilter;
pub use hooks::BatchHook;

pub use types::{BatchResult, EngineOptions, ErrorKind, OperationAction, OperationOutcome};

pub use types::{
    DEFAULT_MAX_WORKERS, DEFAULT_OPERATION_TIMEOUT, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
    MAX_DETAIL_CHARS, MAX_TRANSIENT_RETRIES, MAX_WORKERS,
};

pub use progress::{ProgressCallback, SyncProgress, emit};
