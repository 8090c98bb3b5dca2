use std::sync::{Arc, Mutex};

use crate::sync::{BatchHook, BatchResult, OperationOutcome};

#[derive(Debug, Default)]
struct Tally {
    processed: usize,
    failed: usize,
    skipped: usize,
    outcomes: Vec<OperationOutcome>,
}

/// Thread-safe accumulator for per-repository outcomes.
///
/// Any worker may call [`record`](Self::record) at any time. Counts only ever
/// grow; ordering is imposed once, at [`finalize`](Self::finalize).
pub struct BatchAggregator {
    total: usize,
    tally: Mutex<Tally>,
    hooks: Vec<Arc<dyn BatchHook>>,
}

impl BatchAggregator {
    pub fn new(total: usize, hooks: Vec<Arc<dyn BatchHook>>) -> Self {
        Self {
            total,
            tally: Mutex::new(Tally::default()),
            hooks,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Notify hooks that the batch is starting.
    pub fn start(&self, dry_run: bool) {
        for hook in &self.hooks {
            hook.on_batch_started(self.total, dry_run);
        }
    }

    pub fn record(&self, outcome: OperationOutcome) {
        {
            let mut tally = self.tally.lock().unwrap_or_else(|e| e.into_inner());
            if outcome.success {
                tally.processed += 1;
                if outcome.is_skip() {
                    tally.skipped += 1;
                }
            } else {
                tally.failed += 1;
            }
            tally.outcomes.push(outcome.clone());
        }

        for hook in &self.hooks {
            hook.on_outcome(&outcome);
        }
    }

    /// Number of outcomes recorded so far.
    #[must_use]
    pub fn recorded(&self) -> usize {
        self.tally
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .outcomes
            .len()
    }

    /// Produce the final result, outcomes sorted by repository name.
    ///
    /// Safe to call after a cancellation: the result reflects whatever was
    /// recorded.
    pub fn finalize(&self, cancelled: bool) -> BatchResult {
        let result = {
            let tally = self.tally.lock().unwrap_or_else(|e| e.into_inner());
            let mut outcomes = tally.outcomes.clone();
            outcomes.sort_by(|a, b| a.repository.cmp(&b.repository));
            let failures = outcomes.iter().filter(|o| !o.success).cloned().collect();

            BatchResult {
                processed_count: tally.processed,
                failed_count: tally.failed,
                skipped_count: tally.skipped,
                total_count: self.total,
                failures,
                outcomes,
                cancelled,
            }
        };

        for hook in &self.hooks {
            hook.on_batch_finished(&result);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::sync::{ErrorKind, OperationAction};

    #[derive(Default)]
    struct Journal(Mutex<Vec<String>>);

    impl BatchHook for Journal {
        fn on_batch_started(&self, total: usize, dry_run: bool) {
            self.0.lock().unwrap().push(format!("start {total} {dry_run}"));
        }

        fn on_outcome(&self, outcome: &OperationOutcome) {
            self.0.lock().unwrap().push(format!("outcome {}", outcome.repository));
        }

        fn on_batch_finished(&self, result: &BatchResult) {
            self.0
                .lock()
                .unwrap()
                .push(format!("finish {}", result.failed_count));
        }
    }

    #[test]
    fn counts_and_sorts_outcomes() {
        let aggregator = BatchAggregator::new(3, Vec::new());
        aggregator.record(OperationOutcome::failed(
            "zeta",
            OperationAction::Cloned,
            ErrorKind::ProcessExecutionError,
            "exit 128",
            Duration::ZERO,
        ));
        aggregator.record(OperationOutcome::succeeded(
            "alpha",
            OperationAction::Pulled,
            Duration::ZERO,
        ));
        aggregator.record(OperationOutcome::skipped("mid", "dirty", Duration::ZERO));

        let result = aggregator.finalize(false);
        assert_eq!(result.processed_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.processed_count + result.failed_count, result.total_count);
        let order: Vec<_> = result.outcomes.iter().map(|o| o.repository.as_str()).collect();
        assert_eq!(order, vec!["alpha", "mid", "zeta"]);
        assert_eq!(result.failures[0].repository, "zeta");
    }

    #[test]
    fn concurrent_records_are_all_counted() {
        let aggregator = Arc::new(BatchAggregator::new(200, Vec::new()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let aggregator = Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        aggregator.record(OperationOutcome::succeeded(
                            format!("repo-{t}-{i}"),
                            OperationAction::Cloned,
                            Duration::ZERO,
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(aggregator.recorded(), 200);
        assert_eq!(aggregator.finalize(false).processed_count, 200);
    }

    #[test]
    fn hooks_run_in_order_at_each_lifecycle_point() {
        let first = Arc::new(Journal::default());
        let second = Arc::new(Journal::default());
        let hooks: Vec<Arc<dyn BatchHook>> = vec![first.clone(), second.clone()];
        let aggregator = BatchAggregator::new(1, hooks);

        aggregator.start(true);
        aggregator.record(OperationOutcome::succeeded(
            "api",
            OperationAction::WouldClone,
            Duration::ZERO,
        ));
        aggregator.finalize(false);

        let expected = vec!["start 1 true", "outcome api", "finish 0"];
        assert_eq!(*first.0.lock().unwrap(), expected);
        assert_eq!(*second.0.lock().unwrap(), expected);
    }

    #[test]
    fn finalize_after_cancellation_reports_partial_result() {
        let aggregator = BatchAggregator::new(5, Vec::new());
        aggregator.record(OperationOutcome::succeeded(
            "api",
            OperationAction::Pulled,
            Duration::ZERO,
        ));

        let result = aggregator.finalize(true);
        assert!(result.cancelled);
        assert_eq!(result.processed_count, 1);
        assert_eq!(result.not_started(), 4);
    }
}
