//! GitHub REST client behind the rate limiter
//!
//! Every response, successful or not, is fed to the shared limiter so its
//! quota view tracks the upstream's headers. Every call goes through
//! `RateLimiter::guard`.

use super::error::UpstreamError;
use super::models::{FileDiff, PullRequestRef};
use crate::error::{PagerError, Result};
use crate::metrics::METRICS;
use crate::pager::DiffSource;
use crate::rate_limit::{retry_with_backoff, RateLimiter, RetryConfig};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

const FILES_PER_PAGE: usize = 100;
/// The files endpoint stops at 3000 files
const MAX_FILE_PAGES: u32 = 30;

/// GitHub client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    /// API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API token (read from env GITHUB_TOKEN if not set)
    #[serde(default)]
    pub token: Option<SecretString>,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    concat!("chunk-pager/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl GithubConfig {
    /// Fill the token from `GITHUB_TOKEN` when not configured
    pub fn with_env_token(mut self) -> Self {
        if self.token.is_none() {
            if let Ok(val) = std::env::var("GITHUB_TOKEN") {
                if !val.is_empty() {
                    self.token = Some(SecretString::new(val));
                }
            }
        }
        self
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// GitHub REST client
pub struct GithubClient {
    http: Client,
    config: GithubConfig,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
}

impl GithubClient {
    /// Create a new client sharing `limiter` with other callers of the same API
    pub fn new(config: GithubConfig, limiter: Arc<RateLimiter>) -> std::result::Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        Ok(Self {
            http,
            config,
            limiter,
            retry: RetryConfig::default(),
        })
    }

    /// Use a custom policy for `get_json_with_backoff`
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// GET a JSON resource under the throttling policy
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, UpstreamError> {
        let url = self.url(path);
        let target = url.as_str();
        self.limiter.guard(move || self.fetch_json::<T>(target)).await
    }

    /// GET a JSON resource, additionally retrying retryable failures with
    /// exponential backoff.
    ///
    /// Each backoff attempt is a full `guard` call, which may itself retry
    /// once. A persistently failing resource is therefore requested up to
    /// `2 * (max_retries + 1)` times (8 with the default policy).
    pub async fn get_json_with_backoff<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> std::result::Result<T, UpstreamError> {
        let url = self.url(path);
        let target = url.as_str();
        retry_with_backoff(&self.retry, move || {
            self.limiter.guard(move || self.fetch_json::<T>(target))
        })
        .await
    }

    /// List every changed file of a pull request
    pub async fn pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> std::result::Result<Vec<FileDiff>, UpstreamError> {
        let mut files = Vec::new();

        for page in 1..=MAX_FILE_PAGES {
            let path = format!(
                "/repos/{}/{}/pulls/{}/files?per_page={}&page={}",
                owner, repo, number, FILES_PER_PAGE, page
            );
            let batch: Vec<FileDiff> = self.get_json(&path).await?;
            let done = batch.len() < FILES_PER_PAGE;
            files.extend(batch);
            if done {
                break;
            }
        }

        debug!("Fetched {} files for {}/{}#{}", files.len(), owner, repo, number);
        Ok(files)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> std::result::Result<T, UpstreamError> {
        let mut req = self
            .http
            .get(url)
            .header(ACCEPT, "application/vnd.github+json");

        if let Some(token) = &self.config.token {
            req = req.bearer_auth(token.expose_secret());
        }

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) => {
                METRICS.record_upstream_request(false);
                return Err(e.into());
            }
        };

        self.limiter.observe(response.headers()).await;

        let status = response.status();
        if !status.is_success() {
            METRICS.record_upstream_request(false);
            let headers = response.headers().clone();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let err = UpstreamError::from_response_parts(status.as_u16(), &headers, &body);
            error!("GitHub request to {} failed: {}", url, err);
            return Err(err);
        }

        METRICS.record_upstream_request(true);
        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl DiffSource for GithubClient {
    async fn load(&self, context: &serde_json::Value) -> Result<Vec<FileDiff>> {
        let pr: PullRequestRef = serde_json::from_value(context.clone())
            .map_err(|e| PagerError::Internal(format!("Invalid pull request context: {}", e)))?;
        Ok(self
            .pull_request_files(&pr.owner, &pr.repo, pr.pull_number)
            .await?)
    }
}
