//! Lookup and store request/response types

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Parameters for a cache lookup
#[derive(Debug, Clone)]
pub struct LookupRequest {
    pub query_type: String,
    pub query_text: String,
    /// Query vector; embedded through the configured provider when unset
    pub embedding: Option<Vec<f32>>,
    /// Minimum similarity for a semantic hit; configured value when unset
    pub threshold: Option<f32>,
    /// Number of similarity candidates; configured value when unset
    pub limit: Option<usize>,
    /// Budget for the similarity phase; configured value when unset
    pub timeout: Option<Duration>,
}

impl LookupRequest {
    pub fn new(
        query_type: impl Into<String>,
        query_text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            query_type: query_type.into(),
            query_text: query_text.into(),
            embedding: Some(embedding),
            threshold: None,
            limit: None,
            timeout: None,
        }
    }

    /// Lookup without a precomputed vector
    pub fn from_text(query_type: impl Into<String>, query_text: impl Into<String>) -> Self {
        Self {
            query_type: query_type.into(),
            query_text: query_text.into(),
            embedding: None,
            threshold: None,
            limit: None,
            timeout: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Check caller supplied search parameters
pub(crate) fn validate_search_params(threshold: f32, limit: usize) -> Result<(), DomainError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(DomainError::validation(format!(
            "Threshold must be between 0.0 and 1.0, got {}",
            threshold
        )));
    }

    if limit == 0 {
        return Err(DomainError::validation("Limit must be greater than zero"));
    }

    Ok(())
}

/// A successful lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHit {
    pub cache_id: String,
    pub result: String,
    pub result_type: String,
    /// 1.0 for exact matches, `1 - cosine distance` otherwise
    pub similarity: f32,
    /// Whether the hit came from the exact-match path
    pub exact: bool,
    /// Access count after this hit
    pub access_count: u64,
}

/// Outcome of a lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Hit(CacheHit),
    Miss,
}

impl LookupOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn hit(&self) -> Option<&CacheHit> {
        match self {
            Self::Hit(hit) => Some(hit),
            Self::Miss => None,
        }
    }

    pub fn into_hit(self) -> Option<CacheHit> {
        match self {
            Self::Hit(hit) => Some(hit),
            Self::Miss => None,
        }
    }
}

/// Ranked candidate returned by `find_similar`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub cache_id: String,
    pub similarity: f32,
    pub result: String,
    pub result_type: String,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Parameters for storing a freshly computed result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub query_type: String,
    pub query_text: String,
    pub embedding: Vec<f32>,
    pub result: String,
    pub result_type: String,
    #[serde(default)]
    pub compute_time_ms: u64,
    /// TTL in seconds; the configured TTL for the query type when unset
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl StoreRequest {
    pub fn new(
        query_type: impl Into<String>,
        query_text: impl Into<String>,
        embedding: Vec<f32>,
        result: impl Into<String>,
        result_type: impl Into<String>,
    ) -> Self {
        Self {
            query_type: query_type.into(),
            query_text: query_text.into(),
            embedding,
            result: result.into(),
            result_type: result_type.into(),
            compute_time_ms: 0,
            ttl_seconds: None,
        }
    }

    pub fn with_compute_time_ms(mut self, compute_time_ms: u64) -> Self {
        self.compute_time_ms = compute_time_ms;
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }
}
