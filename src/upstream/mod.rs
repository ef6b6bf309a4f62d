//! Rate-limited upstream API access

pub mod client;
pub mod error;
pub mod models;

pub use client::{GithubClient, GithubConfig};
pub use error::UpstreamError;
pub use models::{FileDiff, PullRequestRef};
