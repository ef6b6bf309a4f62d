//! Metrics collection for observability

use prometheus::{
    Counter, CounterVec, Histogram, Opts, Registry,
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry,
};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Chunking metrics
    pub chunking_requests: Counter,
    pub chunks_produced: Counter,

    // Session metrics
    pub sessions_created: Counter,
    pub session_lookups: CounterVec,
    pub sessions_evicted: Counter,

    // Throttling metrics
    pub rate_limit_waits: CounterVec,
    pub rate_limit_wait_seconds: Histogram,
    pub upstream_requests: CounterVec,
    pub upstream_retries: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let chunking_requests = register_counter_with_registry!(
            Opts::new("chunking_requests_total", "Total chunking requests"),
            registry
        )?;

        let chunks_produced = register_counter_with_registry!(
            Opts::new("chunks_produced_total", "Total chunks produced"),
            registry
        )?;

        let sessions_created = register_counter_with_registry!(
            Opts::new("sessions_created_total", "Total continuation sessions created"),
            registry
        )?;

        let session_lookups = register_counter_vec_with_registry!(
            Opts::new("session_lookups_total", "Total continuation token lookups"),
            &["status"],
            registry
        )?;

        let sessions_evicted = register_counter_with_registry!(
            Opts::new("sessions_evicted_total", "Total sessions evicted by expiry or capacity"),
            registry
        )?;

        let rate_limit_waits = register_counter_vec_with_registry!(
            Opts::new("rate_limit_waits_total", "Total waits imposed by the rate limiter"),
            &["reason"],
            registry
        )?;

        let rate_limit_wait_seconds = register_histogram_with_registry!(
            "rate_limit_wait_seconds",
            "Time spent waiting on the rate limiter in seconds",
            registry
        )?;

        let upstream_requests = register_counter_vec_with_registry!(
            Opts::new("upstream_requests_total", "Total upstream API requests"),
            &["status"],
            registry
        )?;

        let upstream_retries = register_counter_vec_with_registry!(
            Opts::new("upstream_retries_total", "Total upstream retries"),
            &["reason"],
            registry
        )?;

        Ok(Self {
            registry,
            chunking_requests,
            chunks_produced,
            sessions_created,
            session_lookups,
            sessions_evicted,
            rate_limit_waits,
            rate_limit_wait_seconds,
            upstream_requests,
            upstream_retries,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a chunking pass
    pub fn record_chunking(&self, chunks: usize) {
        self.chunking_requests.inc();
        self.chunks_produced.inc_by(chunks as f64);
    }

    /// Record a token lookup outcome
    pub fn record_session_lookup(&self, valid: bool) {
        let status = if valid { "valid" } else { "invalid" };
        self.session_lookups.with_label_values(&[status]).inc();
    }

    /// Record evicted sessions
    pub fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.sessions_evicted.inc_by(count as f64);
        }
    }

    /// Record a rate limiter wait
    pub fn record_rate_limit_wait(&self, reason: &str, seconds: f64) {
        self.rate_limit_waits.with_label_values(&[reason]).inc();
        self.rate_limit_wait_seconds.observe(seconds);
    }

    /// Record an upstream request outcome
    pub fn record_upstream_request(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.upstream_requests.with_label_values(&[status]).inc();
    }

    /// Record an upstream retry
    pub fn record_retry(&self, reason: &str) {
        self.upstream_retries.with_label_values(&[reason]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
