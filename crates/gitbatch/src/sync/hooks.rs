//! Lifecycle hooks.
//!
//! Hooks are an ordered list of injected callbacks. The aggregator invokes
//! them synchronously, in registration order, at three points: when the batch
//! starts, after every recorded outcome, and once the result is final.
//! Hooks run on worker tasks and must not block for long.

use super::types::{BatchResult, OperationOutcome};

pub trait BatchHook: Send + Sync {
    fn on_batch_started(&self, _total: usize, _dry_run: bool) {}

    fn on_outcome(&self, _outcome: &OperationOutcome) {}

    fn on_batch_finished(&self, _result: &BatchResult) {}
}
