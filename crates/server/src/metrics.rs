//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Reelforge server:
//! - HTTP request metrics (latency, counts, errors)
//! - Gate rejections (auth, rate limit, navigation redirects)
//! - Orchestrator and pipeline status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use reelforge_core::{RequestFilter, RequestStatus};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelforge_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelforge_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

/// Requests rejected by the API rate limiter.
pub static RATE_LIMITED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_http_rate_limited_total",
            "API requests rejected by the rate limiter",
        ),
        &["reason"], // "exceeded", "limiter_unavailable"
    )
    .unwrap()
});

// =============================================================================
// Orchestrator Metrics (collected dynamically)
// =============================================================================

/// Orchestrator running state (1 = running, 0 = stopped).
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelforge_orchestrator_running",
        "Whether the orchestrator is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Requests currently inside a processing pass.
pub static REQUESTS_PROCESSING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelforge_requests_processing",
        "Number of content requests currently being processed",
    )
    .unwrap()
});

/// Content requests by current status (collected dynamically).
pub static REQUESTS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "reelforge_content_requests_by_status",
            "Current content request count by status",
        ),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(RATE_LIMITED_TOTAL.clone()))
        .unwrap();

    // Orchestrator
    registry
        .register(Box::new(ORCHESTRATOR_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(REQUESTS_PROCESSING.clone()))
        .unwrap();
    registry
        .register(Box::new(REQUESTS_BY_STATUS.clone()))
        .unwrap();

    // Core metrics (gates, pipeline, orchestrator)
    for metric in reelforge_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the orchestrator and the
/// pipeline store as they are now.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.orchestrator().status().await;
    ORCHESTRATOR_RUNNING.set(if status.running { 1 } else { 0 });
    REQUESTS_PROCESSING.set(status.processing as i64);

    let store = state.pipeline_store();
    for request_status in RequestStatus::ALL {
        let filter = RequestFilter::default().with_status(request_status);
        if let Ok(count) = store.count_requests(&filter) {
            REQUESTS_BY_STATUS
                .with_label_values(&[request_status.as_str()])
                .set(count);
        }
    }
}

static UUID_RE: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap()
});
static NUMERIC_RE: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/requests/550e8400-e29b-41d4-a716-446655440000/progress";
        assert_eq!(normalize_path(path), "/api/v1/requests/{id}/progress");
    }

    #[test]
    fn test_normalize_path_numeric() {
        let path = "/api/v1/campaigns/12345";
        assert_eq!(normalize_path(path), "/api/v1/campaigns/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("reelforge_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_server_and_core_metrics() {
        // Prometheus only outputs vectors that have at least one child
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        RATE_LIMITED_TOTAL.with_label_values(&["exceeded"]).inc();
        ORCHESTRATOR_RUNNING.set(0);
        REQUESTS_BY_STATUS.with_label_values(&["intake"]).set(0);
        reelforge_core::metrics::PASSCODE_ATTEMPTS
            .with_label_values(&["invalid"])
            .inc();

        let output = encode_metrics();

        assert!(output.contains("reelforge_http_request_duration_seconds"));
        assert!(output.contains("reelforge_http_requests_in_flight"));
        assert!(output.contains("reelforge_http_rate_limited_total"));
        assert!(output.contains("reelforge_orchestrator_running"));
        assert!(output.contains("reelforge_content_requests_by_status"));
        assert!(output.contains("reelforge_passcode_attempts_total"));
    }
}
