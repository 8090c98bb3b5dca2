use std::sync::Mutex;
use std::time::Duration;

use gitbatch::sync::SyncProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(100);

/// Consolidated progress state under one lock.
#[derive(Default)]
struct ProgressState {
    /// Spinner for the inventory fetch.
    fetch_bar: Option<ProgressBar>,
    /// Bar for the clone/pull batch.
    batch_bar: Option<ProgressBar>,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::FetchingRepos { entity } => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::spinner_style());
                pb.enable_steady_tick(TICK);
                pb.set_prefix(format!("{:12}", entity));
                pb.set_message("Fetching repositories...");
                state.fetch_bar = Some(pb);
            }

            SyncProgress::FetchedPage {
                page, total_so_far, ..
            } => {
                if let Some(ref pb) = state.fetch_bar {
                    pb.set_message(format!("Page {} ({} repos)", page, total_so_far));
                }
            }

            SyncProgress::RateLimitWait { wait_ms, reset_at } => {
                if let Some(ref pb) = state.fetch_bar {
                    pb.set_message(format!(
                        "⏳ rate limited, waiting {:.0}s (resets {})",
                        wait_ms as f64 / 1000.0,
                        reset_at.format("%H:%M:%S")
                    ));
                }
            }

            SyncProgress::RequestRetry {
                target,
                retry_after_ms,
                attempt,
            } => {
                if let Some(ref pb) = state.fetch_bar {
                    pb.set_message(format!(
                        "⏳ {} failed, retry {} in {:.1}s",
                        target,
                        attempt,
                        retry_after_ms as f64 / 1000.0
                    ));
                }
            }

            SyncProgress::FetchComplete { total, .. } => {
                if let Some(ref pb) = state.fetch_bar {
                    pb.finish_with_message(format!("✓ {} repos fetched", total));
                }
            }

            SyncProgress::CacheHit {
                entity,
                cached_count,
            } => {
                let pb = self.multi.add(ProgressBar::new(1));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", entity));
                pb.set_position(1);
                pb.finish_with_message(format!("✓ {} repos (cached)", cached_count));
                state.fetch_bar = Some(pb);
            }

            SyncProgress::FilterComplete {
                selected, total, ..
            } => {
                if selected < total {
                    drop(state);
                    self.multi
                        .println(format!("  {} of {} repositories selected", selected, total))
                        .ok();
                }
            }

            SyncProgress::ProtocolMismatch {
                repository,
                current,
                desired,
            } => {
                drop(state);
                self.multi
                    .println(format!("⇄ {}: uses {}, wanted {}", repository, current, desired))
                    .ok();
            }

            SyncProgress::ProtocolSwitched {
                repository,
                protocol,
            } => {
                drop(state);
                self.multi
                    .println(format!("✓ {}: origin switched to {}", repository, protocol))
                    .ok();
            }

            SyncProgress::ProtocolSwitchDeclined { repository, kept } => {
                drop(state);
                self.multi
                    .println(format!("· {}: keeping {}", repository, kept))
                    .ok();
            }

            SyncProgress::ProtocolSwitchFailed { repository, error } => {
                drop(state);
                self.multi
                    .println(format!("✗ {}: switching protocol failed: {}", repository, error))
                    .ok();
            }

            SyncProgress::BatchStarted {
                total,
                workers,
                dry_run,
            } => {
                let pb = self.multi.add(ProgressBar::new(total as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", if dry_run { "Planning" } else { "Syncing" }));
                pb.set_message(format!("{} workers", workers));
                state.batch_bar = Some(pb);
            }

            SyncProgress::RepositoryStarted { repository, action } => {
                if let Some(ref pb) = state.batch_bar {
                    pb.set_message(format!("{} {}", action, repository));
                }
            }

            SyncProgress::RepositoryCompleted { outcome } => {
                if let Some(ref pb) = state.batch_bar {
                    pb.inc(1);
                    let symbol = match (outcome.success, outcome.is_skip()) {
                        (false, _) => "✗",
                        (true, true) => "·",
                        (true, false) => "✓",
                    };
                    pb.set_message(format!("{} {}", symbol, outcome.repository));
                }
            }

            SyncProgress::BatchFinished {
                processed,
                failed,
                skipped,
                cancelled,
                ..
            } => {
                if let Some(ref pb) = state.batch_bar {
                    let mut msg = format!("✓ {processed} done ({skipped} skipped), {failed} failed");
                    if cancelled {
                        msg.push_str(" (cancelled)");
                    }
                    pb.finish_with_message(msg);
                }
            }

            SyncProgress::Warning { message } => {
                drop(state);
                self.multi.println(format!("⚠ {}", message)).ok();
            }

            _ => {}
        }
    }

    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.multi.suspend(f)
    }

    /// Finish all progress bars.
    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for pb in [&state.fetch_bar, &state.batch_bar].into_iter().flatten() {
            if !pb.is_finished() {
                pb.finish();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
