//! Gitbatch - batch synchronization of local git working copies.
//!
//! This library keeps a directory of working copies in sync with every
//! repository owned by a GitHub user or organization. A run has two phases:
//!
//! 1. A sequential prelude: the paginated, rate-limit-aware inventory fetch
//!    ([`github::GitHubClient`]), filtering ([`sync::RepoFilter`]), local state
//!    probing ([`git::GitProber`]) and protocol reconciliation ([`reconcile`]).
//! 2. A bounded-parallel phase: the execution engine
//!    ([`sync::Engine`]) clones or pulls each repository on a fixed worker
//!    pool and aggregates per-repository outcomes.
//!
//! [`sync::BatchSync`] wires both phases together.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gitbatch::git::{GitOperations, TokioProcessExecutor};
//! use gitbatch::github::GitHubClient;
//! use gitbatch::sync::{BatchSync, SyncRequest};
//!
//! let client = GitHubClient::new(transport, tokens.clone(), limiter, "/home/me/src");
//! let git = GitOperations::new(Arc::new(TokioProcessExecutor));
//! let sync = BatchSync::new(Arc::new(client), git).with_tokens(tokens);
//! let report = sync.run(&request, None).await?;
//! println!("{} of {} synced", report.result.processed_count, report.result.total_count);
//! ```

pub mod cache;
pub mod credentials;
pub mod git;
pub mod github;
pub mod http;
pub mod reconcile;
pub mod remote;
pub mod retry;
pub mod sync;
pub mod validate;

pub use credentials::{NoToken, StaticTokenProvider, Token, TokenProvider, TokenUnavailable};
pub use git::{Protocol, ProtocolState};
pub use reconcile::{ProtocolMismatch, ResolutionPolicy};
pub use remote::{
    EntityType, InventoryBatch, InventoryClient, InventoryRequest, RemoteError,
    RepositoryDescriptor, Visibility,
};
pub use sync::{
    BatchResult, BatchSync, CancellationFlag, ErrorKind, OperationAction, OperationOutcome,
    ProgressCallback, SyncError, SyncProgress, SyncReport,
};
