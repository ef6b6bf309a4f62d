//! Adaptive throttling for a rate-limited upstream
//!
//! One limiter is shared by every outbound call to the same upstream. Before a
//! call, the limiter waits for the quota window to reset when headroom is
//! below the low-water mark. After a failed call it retries exactly once:
//! after the announced reset for a hard rate-limit rejection, or after a short
//! fixed delay for transient failures.
//!
//! All waits are plain `tokio::time::sleep` calls, so wrapping `guard` in
//! `tokio::time::timeout` or dropping the future cancels them.

use super::state::RateLimitState;
use crate::metrics::METRICS;
use crate::upstream::UpstreamError;
use chrono::Utc;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Remaining quota below which calls wait for the reset
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: u64,

    /// Delay before the single retry of a transient failure
    #[serde(default = "default_transient_retry_delay_ms")]
    pub transient_retry_delay_ms: u64,

    /// Wait used when a rate-limit rejection carries no reset time
    #[serde(default = "default_fallback_reset_wait_secs")]
    pub fallback_reset_wait_secs: u64,

    /// Upper bound on any single wait
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_low_water_mark() -> u64 {
    10
}

fn default_transient_retry_delay_ms() -> u64 {
    1000
}

fn default_fallback_reset_wait_secs() -> u64 {
    60
}

fn default_max_wait_secs() -> u64 {
    3600
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            low_water_mark: default_low_water_mark(),
            transient_retry_delay_ms: default_transient_retry_delay_ms(),
            fallback_reset_wait_secs: default_fallback_reset_wait_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Get transient retry delay as Duration
    pub fn transient_retry_delay(&self) -> Duration {
        Duration::from_millis(self.transient_retry_delay_ms)
    }

    /// Get fallback reset wait as Duration
    pub fn fallback_reset_wait(&self) -> Duration {
        Duration::from_secs(self.fallback_reset_wait_secs)
    }

    /// Get max wait as Duration
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Rate limiter for one upstream
pub struct RateLimiter {
    state: Mutex<RateLimitState>,
    /// Serializes the check-then-reserve step of `acquire`
    admission: Mutex<()>,
    config: RateLimitConfig,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(RateLimitState::default()),
            admission: Mutex::new(()),
            config,
        }
    }

    /// Update quota state from the latest upstream response headers
    pub async fn observe(&self, headers: &HeaderMap) {
        let mut state = self.state.lock().await;
        if state.apply_headers(headers) {
            debug!(
                "Rate limit observed: {}/{} remaining, {} used",
                state.remaining, state.limit, state.used
            );
        }
    }

    /// Replace quota state wholesale
    pub async fn record(&self, state: RateLimitState) {
        *self.state.lock().await = state;
    }

    /// Current quota state
    pub async fn snapshot(&self) -> RateLimitState {
        self.state.lock().await.clone()
    }

    /// Run `operation` under the throttling policy.
    ///
    /// `operation` is invoked at most twice.
    pub async fn guard<T, F, Fut>(&self, mut operation: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        self.acquire().await;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.is_rate_limited() {
            let wait = self.hard_limit_wait(&err).await;
            warn!("Upstream rate limit hit, retrying once in {:?}: {}", wait, err);
            METRICS.record_rate_limit_wait("hard_limit", wait.as_secs_f64());
            METRICS.record_retry("rate_limit");
            tokio::time::sleep(wait).await;

            self.acquire().await;
            return operation().await;
        }

        if err.is_transient() {
            let delay = self.config.transient_retry_delay();
            warn!("Transient upstream failure, retrying once in {:?}: {}", delay, err);
            METRICS.record_retry("transient");
            tokio::time::sleep(delay).await;

            self.acquire().await;
            return operation().await;
        }

        Err(err)
    }

    /// Reserve one request's worth of quota, waiting for the reset first when
    /// below the low-water mark.
    ///
    /// Admission is serialized by its own gate, held across the wait, so
    /// concurrent callers queue instead of all passing on the same stale
    /// headroom. The state lock is only held for reads and writes, so
    /// in-flight calls can still `observe` while a caller waits.
    async fn acquire(&self) {
        let _admission = self.admission.lock().await;

        let pending = {
            let state = self.state.lock().await;
            if state.remaining < self.config.low_water_mark {
                state
                    .until_reset(Utc::now())
                    .map(|wait| (wait.min(self.config.max_wait()), state.remaining))
            } else {
                None
            }
        };

        if let Some((wait, remaining)) = pending {
            info!(
                "Rate limit low ({} remaining), waiting {:?} for reset",
                remaining, wait
            );
            METRICS.record_rate_limit_wait("low_water", wait.as_secs_f64());
            tokio::time::sleep(wait).await;

            // New window, unless a response seen meanwhile announced a later one
            let mut state = self.state.lock().await;
            if state.until_reset(Utc::now()).is_none() {
                state.remaining = state.limit;
                state.used = 0;
                state.reset_at = None;
            }
        }

        let mut state = self.state.lock().await;
        state.remaining = state.remaining.saturating_sub(1);
        state.used = state.used.saturating_add(1);
    }

    async fn hard_limit_wait(&self, err: &UpstreamError) -> Duration {
        let now = Utc::now();
        let reset_at = match err.reset_at() {
            Some(reset_at) => Some(reset_at),
            None => self.state.lock().await.reset_at,
        };

        let wait = match reset_at {
            Some(reset_at) => (reset_at - now).to_std().unwrap_or(Duration::ZERO),
            None => self.config.fallback_reset_wait(),
        };
        wait.min(self.config.max_wait())
    }
}
