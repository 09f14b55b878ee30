//! Cache entry model

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::index::IndexedVector;
use super::key::query_hash;

/// The unit of cached work
///
/// `result` is an opaque payload; the cache never looks inside it and callers
/// deserialize it according to `result_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub(crate) id: String,
    pub(crate) query_type: String,
    pub(crate) query_text: String,
    pub(crate) query_hash: String,
    pub(crate) embedding: Vec<f32>,
    pub(crate) result: String,
    pub(crate) result_type: String,
    pub(crate) ttl_seconds: Option<u64>,
    pub(crate) expires_at: Option<DateTime<Utc>>,
    pub(crate) access_count: u64,
    pub(crate) last_accessed_at: Option<DateTime<Utc>>,
    pub(crate) compute_time_ms: u64,
    pub(crate) avg_similarity_on_hit: f32,
    pub(crate) is_warmed: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a new entry with a fresh id and no TTL
    pub fn new(
        query_type: impl Into<String>,
        query_text: impl Into<String>,
        embedding: Vec<f32>,
        result: impl Into<String>,
        result_type: impl Into<String>,
    ) -> Self {
        let query_type = query_type.into();
        let query_text = query_text.into();
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            query_hash: query_hash(&query_type, &query_text),
            query_type,
            query_text,
            embedding,
            result: result.into(),
            result_type: result_type.into(),
            ttl_seconds: None,
            expires_at: None,
            access_count: 0,
            last_accessed_at: None,
            compute_time_ms: 0,
            avg_similarity_on_hit: 0.0,
            is_warmed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the TTL; expiry is measured from the entry's creation time
    pub fn with_ttl(mut self, ttl_seconds: Option<u64>) -> Self {
        self.ttl_seconds = ttl_seconds;
        self.expires_at = ttl_seconds.map(|ttl| self.created_at + seconds(ttl));
        self
    }

    /// Set the cost of the original computation
    pub fn with_compute_time_ms(mut self, compute_time_ms: u64) -> Self {
        self.compute_time_ms = compute_time_ms;
        self
    }

    /// Mark the entry as pre-populated by the warmer; warmed entries never expire via TTL
    pub fn warmed(mut self) -> Self {
        self.is_warmed = true;
        self.ttl_seconds = None;
        self.expires_at = None;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn query_hash(&self) -> &str {
        &self.query_hash
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn result_type(&self) -> &str {
        &self.result_type
    }

    pub fn ttl_seconds(&self) -> Option<u64> {
        self.ttl_seconds
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        self.last_accessed_at
    }

    pub fn compute_time_ms(&self) -> u64 {
        self.compute_time_ms
    }

    pub fn avg_similarity_on_hit(&self) -> f32 {
        self.avg_similarity_on_hit
    }

    pub fn is_warmed(&self) -> bool {
        self.is_warmed
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the entry has expired at the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Check if entry is expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Timestamp used for LRU ordering; never-accessed entries age from creation
    pub fn recency(&self) -> DateTime<Utc> {
        self.last_accessed_at.unwrap_or(self.created_at)
    }

    /// Apply a confirmed hit: bump the counter, refresh the access time and
    /// fold the similarity into the running mean
    pub fn record_hit(&mut self, similarity: f32, at: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed_at = Some(match self.last_accessed_at {
            Some(previous) if previous > at => previous,
            _ => at,
        });
        self.avg_similarity_on_hit +=
            (similarity - self.avg_similarity_on_hit) / self.access_count as f32;
    }

    /// Overwrite payload fields from a newer store of the same query
    ///
    /// Identity, creation time and usage counters are preserved.
    pub fn refresh_from(&mut self, incoming: &CacheEntry) {
        self.query_text = incoming.query_text.clone();
        self.embedding = incoming.embedding.clone();
        self.result = incoming.result.clone();
        self.result_type = incoming.result_type.clone();
        self.compute_time_ms = incoming.compute_time_ms;
        self.ttl_seconds = incoming.ttl_seconds;
        self.expires_at = incoming.expires_at;
        self.is_warmed = incoming.is_warmed;
        self.updated_at = incoming.updated_at;
    }

    /// Vector view of this entry for a similarity index
    pub fn to_indexed(&self) -> IndexedVector {
        IndexedVector {
            id: self.id.clone(),
            query_type: self.query_type.clone(),
            embedding: self.embedding.clone(),
            expires_at: self.expires_at,
        }
    }
}

fn seconds(secs: u64) -> ChronoDuration {
    ChronoDuration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
}
