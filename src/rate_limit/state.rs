//! Rate-limit quota state mirrored from upstream response headers

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_USED: &str = "x-ratelimit-used";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Upstream quota as of the last observed response.
///
/// Advisory only: the upstream may still reject a request the local state
/// predicted would fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    pub limit: u64,
    pub remaining: u64,
    pub used: u64,
    pub reset_at: Option<DateTime<Utc>>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            limit: 5000,
            remaining: 5000,
            used: 0,
            reset_at: None,
        }
    }
}

impl RateLimitState {
    /// Overwrite the fields present in `headers`, leaving the rest untouched.
    ///
    /// Returns whether any field was present.
    pub fn apply_headers(&mut self, headers: &HeaderMap) -> bool {
        let mut observed = false;

        if let Some(limit) = header_u64(headers, HEADER_LIMIT) {
            self.limit = limit;
            observed = true;
        }
        if let Some(remaining) = header_u64(headers, HEADER_REMAINING) {
            self.remaining = remaining;
            observed = true;
        }
        if let Some(used) = header_u64(headers, HEADER_USED) {
            self.used = used;
            observed = true;
        }
        if let Some(reset_at) = header_u64(headers, HEADER_RESET).and_then(epoch_to_datetime) {
            self.reset_at = Some(reset_at);
            observed = true;
        }

        observed
    }

    /// Time left until the quota window resets, if it is in the future
    pub fn until_reset(&self, now: DateTime<Utc>) -> Option<Duration> {
        let reset_at = self.reset_at?;
        let wait = (reset_at - now).to_std().ok()?;
        if wait.is_zero() {
            None
        } else {
            Some(wait)
        }
    }
}

/// Parse a numeric header
pub fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Reset instant announced by a response, from `x-ratelimit-reset` (epoch
/// seconds) or else `retry-after` (seconds from now).
///
/// Values outside the representable date range are ignored.
pub fn reset_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    header_u64(headers, HEADER_RESET)
        .and_then(epoch_to_datetime)
        .or_else(|| {
            header_u64(headers, HEADER_RETRY_AFTER).and_then(|secs| seconds_after(now, secs))
        })
}

fn seconds_after(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()?;
    now.checked_add_signed(chrono::Duration::try_seconds(secs)?)
}

fn epoch_to_datetime(secs: u64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(i64::try_from(secs).ok()?, 0).single()
}
