//! Error types for the chunk pager

use crate::upstream::UpstreamError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PagerError>;

/// Terminal failures surfaced to callers.
///
/// Internal waits and retries never show up here; a caller sees either a
/// success or exactly one of these kinds.
#[derive(Debug, Error)]
pub enum PagerError {
    /// Malformed, unknown or expired continuation token. Restart the read.
    #[error("Continuation token is invalid or expired")]
    TokenInvalid,

    #[error("Chunk index {requested} out of range ({total} chunks available)")]
    ChunkIndexOutOfRange { requested: usize, total: usize },

    #[error("Upstream rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Transient upstream failure: {0}")]
    TransientUpstreamFailure(String),

    #[error("Upstream request failed: {0}")]
    NonRetryableUpstreamFailure(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PagerError {
    /// Stable machine-readable kind for clients
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TokenInvalid => "token_invalid",
            Self::ChunkIndexOutOfRange { .. } => "chunk_index_out_of_range",
            Self::RateLimitExceeded(_) => "rate_limit_exceeded",
            Self::TransientUpstreamFailure(_) => "transient_upstream_failure",
            Self::NonRetryableUpstreamFailure(_) => "non_retryable_upstream_failure",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether resubmitting the same request is safe.
    ///
    /// Upstream failures may have partially mutated remote state, so only the
    /// pagination errors qualify.
    pub fn is_resubmittable(&self) -> bool {
        matches!(self, Self::TokenInvalid | Self::ChunkIndexOutOfRange { .. })
    }
}

impl From<UpstreamError> for PagerError {
    fn from(err: UpstreamError) -> Self {
        if err.is_rate_limited() {
            Self::RateLimitExceeded(err.to_string())
        } else if err.is_retryable() {
            Self::TransientUpstreamFailure(err.to_string())
        } else {
            Self::NonRetryableUpstreamFailure(err.to_string())
        }
    }
}

impl From<::config::ConfigError> for PagerError {
    fn from(err: ::config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
