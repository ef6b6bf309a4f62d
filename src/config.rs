//! Layered configuration
//!
//! Sources, lowest precedence first: built-in defaults, an optional config
//! file, then `CHUNK_PAGER__<SECTION>__<KEY>` environment variables. A `.env`
//! file is read into the environment before anything else.

use crate::chunking::ChunkingConfig;
use crate::error::{PagerError, Result};
use crate::logging::LoggingConfig;
use crate::rate_limit::{RateLimitConfig, RetryConfig};
use crate::session::SessionConfig;
use crate::upstream::GithubConfig;
use serde::Deserialize;
use tracing::debug;

const ENV_PREFIX: &str = "CHUNK_PAGER";
const ENV_SEPARATOR: &str = "__";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration. A missing file is not an error.
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let mut loaded: Config = builder.build()?.try_deserialize()?;
        loaded.github = loaded.github.with_env_token();
        loaded.validate()?;

        debug!(
            "Loaded configuration (max_cost={}, ttl={}s, low_water_mark={})",
            loaded.chunking.max_cost, loaded.session.ttl_secs, loaded.rate_limit.low_water_mark
        );
        Ok(loaded)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        self.session.validate()?;

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(PagerError::Configuration(format!(
                "retry.max_delay_ms ({}) must not be below retry.base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.max_cost, 4000);
        assert_eq!(config.session.ttl_secs, 1800);
        assert_eq!(config.rate_limit.low_water_mark, 10);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = Config::default();
        config.chunking.max_cost = 0;
        assert!(matches!(config.validate(), Err(PagerError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = Config::default();
        config.session.ttl_secs = 0;
        assert!(matches!(config.validate(), Err(PagerError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_ttl() {
        let mut config = Config::default();
        config.session.ttl_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(PagerError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let mut config = Config::default();
        config.retry.base_delay_ms = 5000;
        config.retry.max_delay_ms = 1000;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("chunk-pager-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "[chunking]\nmax_cost = 1200\n\n[session]\nttl_secs = 90\n\n[logging]\njson = true\n",
        )
        .unwrap();

        let config = Config::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.chunking.max_cost, 1200);
        assert_eq!(config.chunking.overlap_lines, 3);
        assert_eq!(config.session.ttl_secs, 90);
        assert_eq!(config.session.sweep_interval_secs, 60);
        assert!(config.logging.json);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load(Some("/nonexistent/chunk-pager")).unwrap();
        assert_eq!(config.retry.base_delay_ms, 1000);
    }
}
