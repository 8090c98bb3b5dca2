use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use super::errors::RemoteError;
use super::types::RateLimitInfo;
use crate::sync::{ProgressCallback, SyncProgress, emit};

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default limits (requests per second).
pub mod rate_limits {
    /// GitHub allows 5000 requests/hour; 10/sec leaves room for bursts.
    pub const GITHUB_DEFAULT_RPS: u32 = 10;
    /// Start waiting for the reset when fewer requests than this remain.
    pub const DEFAULT_LOW_WATER_MARK: usize = 5;
    /// Longest we are willing to sleep for a quota reset.
    pub const DEFAULT_MAX_WAIT_SECS: u64 = 3600;
}

/// Source of wall-clock time and sleeping for the rate limiter.
///
/// Injected so tests can drive quota resets deterministically.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Real wall clock, sleeping on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock pinned to a fixed wall-clock instant that advances with tokio time.
///
/// Under a paused tokio runtime, `now()` moves only when virtual time does,
/// which makes "not before T" assertions exact.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    anchor: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl AnchoredClock {
    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for AnchoredClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now().duration_since(self.started);
        self.anchor + chrono::Duration::from_std(elapsed).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Request pacing with the governor crate.
///
/// # Example
///
/// ```ignore
/// let limiter = ApiRateLimiter::new(10);
/// limiter.wait().await;
/// transport.send(request).await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// `requests_per_second` of 0 is treated as 1.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

/// Tuning for [`QuotaRateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Wait for the reset once remaining quota drops below this.
    pub low_water_mark: usize,
    /// Fail with `RateLimited` instead of sleeping longer than this.
    pub max_wait: Duration,
    /// Optional proactive pacing. `None` disables it.
    pub requests_per_second: Option<u32>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            low_water_mark: rate_limits::DEFAULT_LOW_WATER_MARK,
            max_wait: Duration::from_secs(rate_limits::DEFAULT_MAX_WAIT_SECS),
            requests_per_second: Some(rate_limits::GITHUB_DEFAULT_RPS),
        }
    }
}

impl RateLimitPolicy {
    /// Same policy without proactive pacing.
    #[must_use]
    pub fn without_pacing(mut self) -> Self {
        self.requests_per_second = None;
        self
    }
}

#[derive(Debug, Default)]
struct QuotaState {
    remaining: Option<usize>,
    reset_at: Option<DateTime<Utc>>,
}

/// Remote quota tracker owned by one inventory client.
///
/// Every response feeds [`update`](Self::update); every request first calls
/// [`wait`](Self::wait), which suspends until the quota resets when the last
/// known remaining count is below the low-water mark.
pub struct QuotaRateLimiter {
    state: Mutex<QuotaState>,
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    pacer: Option<ApiRateLimiter>,
}

impl QuotaRateLimiter {
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        let pacer = policy.requests_per_second.map(ApiRateLimiter::new);
        Self {
            state: Mutex::new(QuotaState::default()),
            policy,
            clock,
            pacer,
        }
    }

    /// System clock, default policy.
    pub fn system() -> Self {
        Self::new(RateLimitPolicy::default(), Arc::new(SystemClock))
    }

    #[must_use]
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Record the quota reported by a response.
    pub fn update(&self, info: RateLimitInfo) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.remaining = Some(info.remaining);
        state.reset_at = Some(info.reset_at);
    }

    /// Record an explicit exhaustion signal (403/429 without usable headers).
    pub fn mark_exhausted(&self, reset_at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.remaining = Some(0);
        state.reset_at = Some(reset_at);
    }

    /// Last known remaining count, if any response reported one.
    #[must_use]
    pub fn remaining(&self) -> Option<usize> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).remaining
    }

    /// How long the next request has to wait, and for which reset.
    fn pending_wait(&self) -> Option<(Duration, DateTime<Utc>)> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let remaining = state.remaining?;
        let reset_at = state.reset_at?;
        if remaining >= self.policy.low_water_mark {
            return None;
        }
        let wait = (reset_at - self.clock.now()).to_std().ok()?;
        (!wait.is_zero()).then_some((wait, reset_at))
    }

    /// Suspend until a request may be sent.
    ///
    /// # Errors
    ///
    /// [`RemoteError::RateLimited`] if the reset is further away than
    /// `max_wait`.
    pub async fn wait(&self, on_progress: Option<&ProgressCallback>) -> Result<(), RemoteError> {
        if let Some((wait, reset_at)) = self.pending_wait() {
            if wait > self.policy.max_wait {
                return Err(RemoteError::RateLimited { reset_at });
            }

            emit(
                on_progress,
                SyncProgress::RateLimitWait {
                    wait_ms: wait.as_millis() as u64,
                    reset_at,
                },
            );
            tracing::info!(
                wait_secs = wait.as_secs(),
                reset_at = %reset_at,
                "Rate limit nearly exhausted, waiting for reset"
            );
            self.clock.sleep(wait).await;

            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.reset_at == Some(reset_at) {
                state.remaining = None;
            }
        }

        if let Some(pacer) = &self.pacer {
            pacer.wait().await;
        }
        Ok(())
    }
}
