//! Chunked pagination of large diffs with expiring continuation tokens
//!
//! Large payloads are split into budget-sized chunks, callers page through
//! them across stateless calls with an opaque token, and every outbound call
//! to the upstream API goes through an adaptive rate limiter.

pub mod chunking;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pager;
pub mod rate_limit;
pub mod session;
pub mod upstream;

pub use chunking::{Chunk, ChunkingConfig, ChunkingEngine, HeuristicEstimator, SizeEstimator};
pub use config::Config;
pub use error::{PagerError, Result};
pub use logging::LoggingConfig;
pub use pager::{ChunkPager, DiffSource, Page};
pub use rate_limit::{retry_with_backoff, RateLimitConfig, RateLimitState, RateLimiter, RetryConfig};
pub use session::{PaginationRecord, Position, SessionConfig, SessionStore, Totals};
pub use upstream::{FileDiff, GithubClient, GithubConfig, PullRequestRef, UpstreamError};
