//! Observability configuration

use serde::Deserialize;

/// Prometheus metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,
    /// Histogram buckets for the similarity of semantic hits
    #[serde(default = "default_similarity_buckets")]
    pub similarity_buckets: Vec<f64>,
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_similarity_buckets() -> Vec<f64> {
    vec![0.80, 0.85, 0.90, 0.92, 0.94, 0.96, 0.98, 0.99, 1.0]
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
            similarity_buckets: default_similarity_buckets(),
        }
    }
}
