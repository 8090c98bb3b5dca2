//! Local git working copies.
//!
//! # Module Structure
//!
//! - [`process`] - the process execution boundary and its tokio implementation
//! - [`protocol`] - `Protocol`, `ProtocolState` and remote URL classification
//! - [`probe`] - `LocalStateProber` and the filesystem/git backed `GitProber`
//! - [`ops`] - clone, pull and remote switching through `GitOperations`

pub mod ops;
pub mod probe;
pub mod process;
pub mod protocol;

pub use ops::{GitError, GitOperations, LOCAL_COMMAND_TIMEOUT, PullResult, RemoteSwitcher};
pub use probe::{GitProber, LocalStateProber, ProbeError};
pub use process::{ProcessError, ProcessExecutor, ProcessOutput, TokioProcessExecutor};
pub use protocol::{Protocol, ProtocolState, classify_remote_url};
