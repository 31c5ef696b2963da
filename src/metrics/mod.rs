//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, CounterVec,
    Histogram, HistogramVec, Opts, Registry,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Session memory metrics
    pub session_appends: Counter,
    pub sessions_created: Counter,
    pub sessions_deleted: Counter,
    pub summarizations: Counter,
    pub persistence_failures: CounterVec,

    // Compressor metrics
    pub compressions: CounterVec,
    pub compression_duration: Histogram,

    // Chunking metrics
    pub chunk_requests: Counter,
    pub chunks_produced: Histogram,

    // HTTP metrics
    pub http_requests: CounterVec,
    pub http_request_duration: HistogramVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let session_appends = register_counter_with_registry!(
            Opts::new("session_appends_total", "Total turns appended to sessions"),
            registry
        )?;

        let sessions_created = register_counter_with_registry!(
            Opts::new("sessions_created_total", "Total sessions created"),
            registry
        )?;

        let sessions_deleted = register_counter_with_registry!(
            Opts::new("sessions_deleted_total", "Total sessions deleted"),
            registry
        )?;

        let summarizations = register_counter_with_registry!(
            Opts::new("session_summarizations_total", "Total session summarization passes"),
            registry
        )?;

        let persistence_failures = register_counter_vec_with_registry!(
            Opts::new("session_persistence_failures_total", "Failed session storage operations"),
            &["operation"],
            registry
        )?;

        let compressions = register_counter_vec_with_registry!(
            Opts::new("context_compressions_total", "Context compressions by outcome"),
            &["outcome"],
            registry
        )?;

        let compression_duration = register_histogram_with_registry!(
            "context_compression_duration_seconds",
            "Context compression duration in seconds",
            registry
        )?;

        let chunk_requests = register_counter_with_registry!(
            Opts::new("chunk_requests_total", "Total chunking requests"),
            registry
        )?;

        let chunks_produced = register_histogram_with_registry!(
            "chunks_produced",
            "Chunks produced per chunking request",
            registry
        )?;

        let http_requests = register_counter_vec_with_registry!(
            Opts::new("http_requests_total", "Total HTTP requests"),
            &["endpoint", "status"],
            registry
        )?;

        let http_request_duration = register_histogram_vec_with_registry!(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            &["endpoint"],
            registry
        )?;

        Ok(Self {
            registry,
            session_appends,
            sessions_created,
            sessions_deleted,
            summarizations,
            persistence_failures,
            compressions,
            compression_duration,
            chunk_requests,
            chunks_produced,
            http_requests,
            http_request_duration,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a compression attempt; `outcome` is `llm` or `fallback`
    pub fn record_compression(&self, outcome: &str, seconds: f64) {
        self.compressions.with_label_values(&[outcome]).inc();
        self.compression_duration.observe(seconds);
    }

    /// Record a failed storage operation
    pub fn record_persistence_failure(&self, operation: &str) {
        self.persistence_failures.with_label_values(&[operation]).inc();
    }

    /// Record a chunking request
    pub fn record_chunking(&self, chunk_count: usize) {
        self.chunk_requests.inc();
        self.chunks_produced.observe(chunk_count as f64);
    }

    /// Record an HTTP request
    pub fn record_http(&self, endpoint: &str, status: u16, seconds: f64) {
        self.http_requests
            .with_label_values(&[endpoint, &status.to_string()])
            .inc();
        self.http_request_duration
            .with_label_values(&[endpoint])
            .observe(seconds);
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
