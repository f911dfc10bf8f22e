//! Metrics and observability utilities
//!
//! Prometheus-style counters and histograms for the question pipeline
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all NavalQA metrics
pub const METRICS_PREFIX: &str = "navalqa";

/// Histogram buckets for request latency (in seconds).
/// Resolution deliberately waits on the politeness limiter, so the range is wide.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    3.000,  // 3s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 1m
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_resolutions_total", METRICS_PREFIX),
        Unit::Count,
        "Subject resolutions by outcome and deciding tier"
    );

    describe_histogram!(
        format!("{}_resolution_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Subject resolution latency in seconds"
    );

    describe_counter!(
        format!("{}_knowledge_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Knowledge source API requests by operation and status"
    );

    describe_histogram!(
        format!("{}_knowledge_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Knowledge source API latency in seconds"
    );

    describe_counter!(
        format!("{}_composer_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Answer composer requests by status"
    );

    describe_histogram!(
        format!("{}_composer_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Answer composer latency in seconds"
    );

    describe_counter!(
        format!("{}_citation_probes_total", METRICS_PREFIX),
        Unit::Count,
        "Citation candidate probes by outcome"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a finished resolution
pub fn record_resolution(duration_secs: f64, outcome: &str, tier: &str) {
    counter!(
        format!("{}_resolutions_total", METRICS_PREFIX),
        "outcome" => outcome.to_string(),
        "tier" => tier.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_resolution_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// Helper to record one knowledge source API call
pub fn record_knowledge_call(duration_secs: f64, operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_knowledge_requests_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_knowledge_duration_seconds", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Helper to record answer composer metrics
pub fn record_composer(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_composer_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_composer_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record a citation probe
pub fn record_citation_probe(reachable: bool) {
    let outcome = if reachable { "reachable" } else { "unreachable" };

    counter!(
        format!("{}_citation_probes_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}
