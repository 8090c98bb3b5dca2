use gitbatch::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::FetchingRepos { entity } => {
                tracing::info!(entity = %entity, "Fetching repositories");
            }

            SyncProgress::FetchedPage {
                entity,
                page,
                count,
                total_so_far,
            } => {
                tracing::debug!(entity = %entity, page, count, total_so_far, "Fetched page");
            }

            SyncProgress::FetchComplete { entity, total } => {
                tracing::info!(entity = %entity, total, "Fetch complete");
            }

            SyncProgress::CacheHit {
                entity,
                cached_count,
            } => {
                tracing::info!(
                    entity = %entity,
                    cached_count,
                    "Cache hit - loaded from local cache"
                );
            }

            SyncProgress::RateLimitWait { wait_ms, reset_at } => {
                tracing::warn!(wait_ms, reset_at = %reset_at, "Rate limited, waiting for reset");
            }

            SyncProgress::RequestRetry {
                target,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(
                    request = %target,
                    retry_after_ms,
                    attempt,
                    "Request failed, retrying"
                );
            }

            SyncProgress::FilterComplete {
                entity,
                selected,
                total,
            } => {
                tracing::info!(entity = %entity, selected, total, "Filter complete");
            }

            SyncProgress::ProtocolMismatch {
                repository,
                current,
                desired,
            } => {
                tracing::info!(
                    repo = %repository,
                    current = %current,
                    desired = %desired,
                    "Protocol mismatch"
                );
            }

            SyncProgress::ProtocolSwitched {
                repository,
                protocol,
            } => {
                tracing::info!(repo = %repository, protocol = %protocol, "Switched protocol");
            }

            SyncProgress::ProtocolSwitchDeclined { repository, kept } => {
                tracing::info!(repo = %repository, kept = %kept, "Keeping existing protocol");
            }

            SyncProgress::ProtocolSwitchFailed { repository, error } => {
                tracing::warn!(repo = %repository, error = %error, "Failed to switch protocol");
            }

            SyncProgress::BatchStarted {
                total,
                workers,
                dry_run,
            } => {
                tracing::info!(total, workers, dry_run, "Processing repositories");
            }

            SyncProgress::RepositoryStarted { repository, action } => {
                tracing::debug!(repo = %repository, action = %action, "Started");
            }

            SyncProgress::RepositoryCompleted { outcome } => {
                let detail = outcome.detail.as_deref().unwrap_or_default();
                if !outcome.success {
                    tracing::warn!(
                        repo = %outcome.repository,
                        action = %outcome.action,
                        error_kind = ?outcome.error_kind,
                        detail,
                        "Failed"
                    );
                } else if outcome.is_skip() {
                    tracing::info!(repo = %outcome.repository, reason = detail, "Skipped");
                } else {
                    tracing::info!(
                        repo = %outcome.repository,
                        action = %outcome.action,
                        duration_ms = outcome.duration_ms,
                        "Done"
                    );
                }
            }

            SyncProgress::BatchFinished {
                processed,
                failed,
                skipped,
                total,
                cancelled,
            } => {
                tracing::info!(processed, failed, skipped, total, cancelled, "Batch complete");
            }

            SyncProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
