//! Exponential backoff for transient inventory requests.
//!
//! Only [`RemoteError::is_transient`] failures are retried. Rate limiting is
//! handled by the caller, which waits for the quota reset instead.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::remote::{RemoteError, short_error_message};
use crate::sync::{
    INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_TRANSIENT_RETRIES, ProgressCallback, SyncProgress,
    emit,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(INITIAL_BACKOFF_MS),
            Duration::from_millis(MAX_BACKOFF_MS),
            MAX_TRANSIENT_RETRIES as usize,
        )
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            jitter: true,
        }
    }

    /// Deterministic delays, mostly for tests.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);
        if self.jitter { builder.with_jitter() } else { builder }
    }
}

/// Run `request_fn` until it succeeds, fails permanently, or the retries in
/// `config` run out. The last error is returned in the latter two cases.
///
/// Every retry emits [`SyncProgress::RequestRetry`] naming `request`.
pub async fn retry_transient<T, F, Fut>(
    config: &RetryConfig,
    request: &str,
    on_progress: Option<&ProgressCallback>,
    request_fn: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0u32;
    request_fn
        .retry(config.backoff())
        .when(RemoteError::is_transient)
        .notify(|err, delay| {
            attempt += 1;
            tracing::debug!(
                request,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying after transient failure: {}",
                short_error_message(err)
            );
            emit(
                on_progress,
                SyncProgress::RequestRetry {
                    target: request.to_string(),
                    retry_after_ms: delay.as_millis() as u64,
                    attempt,
                },
            );
        })
        .await
}
