//! Prometheus metrics infrastructure

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use super::config::MetricsConfig;

const HIT_SIMILARITY: &str = "semantic_cache_hit_similarity";

/// Prometheus metrics handle for serving metrics endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Get the metrics as a string for the /metrics endpoint
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Initialize Prometheus metrics
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    let builder = match PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full(HIT_SIMILARITY.to_string()),
        &config.similarity_buckets,
    ) {
        Ok(builder) => builder,
        Err(e) => {
            tracing::warn!("Invalid similarity buckets, using defaults: {}", e);
            PrometheusBuilder::new()
        }
    };

    match builder.install_recorder() {
        Ok(handle) => {
            gauge!("semantic_cache_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

            tracing::info!("Prometheus metrics initialized at {}", config.path);

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// Create the metrics router
pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

/// Record an HTTP request handled by the API
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Outcome label of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcomeLabel {
    ExactHit,
    SemanticHit,
    Miss,
    /// Miss caused by an internal failure or an exhausted budget
    FailOpen,
}

impl LookupOutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactHit => "exact_hit",
            Self::SemanticHit => "semantic_hit",
            Self::Miss => "miss",
            Self::FailOpen => "fail_open",
        }
    }
}

/// Record a completed lookup
pub fn record_lookup(query_type: &str, outcome: LookupOutcomeLabel) {
    counter!(
        "semantic_cache_lookups_total",
        "query_type" => query_type.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record the similarity of a confirmed hit
pub fn record_hit_similarity(query_type: &str, similarity: f32) {
    histogram!(HIT_SIMILARITY, "query_type" => query_type.to_string())
        .record(f64::from(similarity));
}

/// Record a store attempt
pub fn record_store(query_type: &str, success: bool) {
    counter!(
        "semantic_cache_stores_total",
        "query_type" => query_type.to_string(),
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Record entries removed by the maintenance passes; `reason` is `expired` or `capacity`
pub fn record_removals(reason: &'static str, count: usize) {
    if count == 0 {
        return;
    }

    counter!("semantic_cache_evictions_total", "reason" => reason).increment(count as u64);
}
