//! Adaptive throttling and retry for rate-limited upstream APIs

pub mod backoff;
pub mod limiter;
pub mod state;

pub use backoff::{retry_with_backoff, RetryConfig};
pub use limiter::{RateLimitConfig, RateLimiter};
pub use state::RateLimitState;
