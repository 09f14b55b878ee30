//! Semantic cache configuration

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Configuration for the semantic result cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    /// Embedding dimensionality for this deployment
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Default similarity threshold for semantic hits (0.0 to 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Number of similarity candidates fetched per lookup
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Budget for the similarity phase of a lookup, in milliseconds
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    /// TTL applied when a store does not pass one; `0` (or `None`) means no TTL
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: Option<u64>,

    /// Maximum number of entries per query type
    #[serde(default = "default_max_entries_per_type")]
    pub max_entries_per_type: usize,

    /// Interval between background expiry/eviction passes, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum number of rows deleted per batch
    #[serde(default = "default_eviction_batch_size")]
    pub eviction_batch_size: usize,

    /// Horizon used by stats to count entries that expire soon, in seconds
    #[serde(default = "default_stats_expiry_horizon_secs")]
    pub stats_expiry_horizon_secs: u64,

    /// Per query type overrides
    #[serde(default)]
    pub query_types: HashMap<String, QueryTypeConfig>,
}

/// Overrides for a single query type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryTypeConfig {
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
    #[serde(default)]
    pub max_entries: Option<usize>,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

fn default_embedding_dimensions() -> usize {
    1536
}

fn default_similarity_threshold() -> f32 {
    0.92
}

fn default_search_limit() -> usize {
    5
}

fn default_search_timeout_ms() -> u64 {
    250
}

fn default_ttl_secs() -> Option<u64> {
    Some(86_400)
}

fn default_max_entries_per_type() -> usize {
    10_000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_eviction_batch_size() -> usize {
    500
}

fn default_stats_expiry_horizon_secs() -> u64 {
    3600
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            embedding_dimensions: default_embedding_dimensions(),
            similarity_threshold: default_similarity_threshold(),
            search_limit: default_search_limit(),
            search_timeout_ms: default_search_timeout_ms(),
            default_ttl_secs: default_ttl_secs(),
            max_entries_per_type: default_max_entries_per_type(),
            sweep_interval_secs: default_sweep_interval_secs(),
            eviction_batch_size: default_eviction_batch_size(),
            stats_expiry_horizon_secs: default_stats_expiry_horizon_secs(),
            query_types: HashMap::new(),
        }
    }
}

impl SemanticCacheConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Similarity threshold for a query type
    pub fn threshold_for(&self, query_type: &str) -> f32 {
        self.query_types
            .get(query_type)
            .and_then(|c| c.similarity_threshold)
            .unwrap_or(self.similarity_threshold)
    }

    /// Capacity limit for a query type
    pub fn max_entries_for(&self, query_type: &str) -> usize {
        self.query_types
            .get(query_type)
            .and_then(|c| c.max_entries)
            .unwrap_or(self.max_entries_per_type)
    }

    /// TTL applied to stores of a query type that do not pass one
    ///
    /// A TTL of `0` at either level means entries never expire; a per-type `0`
    /// overrides a non-zero default.
    pub fn ttl_for(&self, query_type: &str) -> Option<u64> {
        self.query_types
            .get(query_type)
            .and_then(|c| c.ttl_secs)
            .or(self.default_ttl_secs)
            .filter(|secs| *secs > 0)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stats_expiry_horizon(&self) -> Duration {
        Duration::from_secs(self.stats_expiry_horizon_secs)
    }

    /// Check the configuration for values the cache cannot work with
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.embedding_dimensions == 0 {
            return Err(DomainError::configuration(
                "embedding_dimensions must be greater than zero",
            ));
        }

        if self.search_limit == 0 {
            return Err(DomainError::configuration(
                "search_limit must be greater than zero",
            ));
        }

        if self.eviction_batch_size == 0 {
            return Err(DomainError::configuration(
                "eviction_batch_size must be greater than zero",
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(DomainError::configuration(
                "sweep_interval_secs must be greater than zero",
            ));
        }

        let thresholds = std::iter::once(("default", Some(self.similarity_threshold))).chain(
            self.query_types
                .iter()
                .map(|(name, c)| (name.as_str(), c.similarity_threshold)),
        );

        for (name, threshold) in thresholds {
            if let Some(t) = threshold {
                if !(0.0..=1.0).contains(&t) {
                    return Err(DomainError::configuration(format!(
                        "similarity_threshold for '{}' must be between 0.0 and 1.0",
                        name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Set the embedding dimensionality
    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    /// Set the default similarity threshold
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the number of candidates fetched per lookup
    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    /// Set the similarity search budget
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the default TTL
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl_secs = ttl.map(|d| d.as_secs());
        self
    }

    /// Set the default capacity per query type
    pub fn with_max_entries_per_type(mut self, max: usize) -> Self {
        self.max_entries_per_type = max;
        self
    }

    /// Set the eviction batch size
    pub fn with_eviction_batch_size(mut self, size: usize) -> Self {
        self.eviction_batch_size = size;
        self
    }

    /// Set the background sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = interval.as_secs().max(1);
        self
    }

    /// Override settings for one query type
    pub fn with_query_type(mut self, query_type: impl Into<String>, config: QueryTypeConfig) -> Self {
        self.query_types.insert(query_type.into(), config);
        self
    }
}
