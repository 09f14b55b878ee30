//! Cache endpoint request and response bodies

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{LookupOutcome, LookupRequest, SimilarMatch, StoreRequest, WarmEntry};

/// Body of `POST /v1/cache/lookup`
#[derive(Debug, Clone, Deserialize)]
pub struct LookupApiRequest {
    pub query_type: String,
    pub query_text: String,
    /// Embedded by the configured provider when omitted
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl From<LookupApiRequest> for LookupRequest {
    fn from(body: LookupApiRequest) -> Self {
        Self {
            query_type: body.query_type,
            query_text: body.query_text,
            embedding: body.embedding,
            threshold: body.threshold,
            limit: body.limit,
            timeout: body.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Lookup result; hit fields are omitted on a miss
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupApiResponse {
    pub hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_count: Option<u64>,
}

impl From<LookupOutcome> for LookupApiResponse {
    fn from(outcome: LookupOutcome) -> Self {
        match outcome {
            LookupOutcome::Hit(hit) => Self {
                hit: true,
                cache_id: Some(hit.cache_id),
                similarity: Some(hit.similarity),
                result: Some(hit.result),
                result_type: Some(hit.result_type),
                exact: Some(hit.exact),
                access_count: Some(hit.access_count),
            },
            LookupOutcome::Miss => Self::default(),
        }
    }
}

/// Body of `POST /v1/cache/store`
#[derive(Debug, Clone, Deserialize)]
pub struct StoreApiRequest {
    #[serde(flatten)]
    pub entry: StoreRequest,
    /// Accept the write and return before it completes
    #[serde(default)]
    pub detached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreApiResponse {
    /// Absent for detached stores
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_id: Option<String>,
}

/// Body of `POST /v1/cache/similar`
#[derive(Debug, Clone, Deserialize)]
pub struct SimilarApiRequest {
    pub query_type: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Used when `embedding` is omitted
    #[serde(default)]
    pub query_text: Option<String>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarApiResponse {
    pub matches: Vec<SimilarMatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsQuery {
    pub query_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictResponse {
    pub evicted: usize,
}

/// Body of `POST /admin/cache/warm`
#[derive(Debug, Clone, Deserialize)]
pub struct WarmApiRequest {
    pub entries: Vec<WarmEntry>,
}
