//! Upstream failure classification

use crate::rate_limit::state::{header_u64, reset_from_headers, HEADER_REMAINING, HEADER_RETRY_AFTER};
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use thiserror::Error;

/// Failure of a single upstream call
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("Status {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// Upstream signalled quota exhaustion
        rate_limited: bool,
        /// When the quota resets, if the response said so
        reset_at: Option<DateTime<Utc>>,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// Plain status failure without rate-limit signals
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
            rate_limited: false,
            reset_at: None,
        }
    }

    /// Classify a non-success response
    pub fn from_response_parts(status: u16, headers: &HeaderMap, body: &str) -> Self {
        let quota_exhausted = header_u64(headers, HEADER_REMAINING) == Some(0);
        let retry_after = headers.contains_key(HEADER_RETRY_AFTER);
        let mentions_limit = body.to_lowercase().contains("rate limit");

        let rate_limited =
            matches!(status, 403 | 429) && (quota_exhausted || retry_after || mentions_limit);
        let reset_at = if rate_limited {
            reset_from_headers(headers, Utc::now())
        } else {
            None
        };

        Self::Status {
            status,
            message: body.chars().take(500).collect(),
            rate_limited,
            reset_at,
        }
    }

    /// HTTP status, if the failure carried one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Reset instant announced with the failure
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Status { reset_at, .. } => *reset_at,
            _ => None,
        }
    }

    /// Hard quota rejection: 403 with a rate-limit signal, or any failure
    /// that carries an explicit reset time
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Status {
                status,
                rate_limited,
                reset_at,
                ..
            } => (*status == 403 && *rate_limited) || reset_at.is_some(),
            _ => false,
        }
    }

    /// Server-side or network condition likely to clear on its own
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => (500..600).contains(status),
            Self::Timeout(_) | Self::Connection(_) => true,
            _ => false,
        }
    }

    /// Eligible for the generic backoff helper
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                (500..600).contains(status) || *status == 408 || *status == 429
            }
            Self::Timeout(_) | Self::Connection(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::status(status.as_u16(), err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}
