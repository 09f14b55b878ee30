//! Similarity index abstraction

use chrono::{DateTime, Utc};

use async_trait::async_trait;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Vector registered in a similarity index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub id: String,
    pub query_type: String,
    pub embedding: Vec<f32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Nearest-neighbor query scoped to one query type
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub query_type: String,
    pub embedding: Vec<f32>,
    pub limit: usize,
    /// Entries expiring at or before this instant are excluded
    pub now: DateTime<Utc>,
}

impl IndexQuery {
    pub fn new(query_type: impl Into<String>, embedding: Vec<f32>, limit: usize) -> Self {
        Self {
            query_type: query_type.into(),
            embedding,
            limit,
            now: Utc::now(),
        }
    }
}

/// Candidate returned by an index, ranked by ascending cosine distance
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub id: String,
    pub distance: f32,
}

impl IndexMatch {
    pub fn new(id: impl Into<String>, distance: f32) -> Self {
        Self {
            id: id.into(),
            distance,
        }
    }

    /// `1 - cosine distance`
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Approximate nearest-neighbor index over cache embeddings
///
/// Implementations may be in-process (rebuilt from the store on startup) or
/// backed by the store itself, in which case `insert`/`remove` are no-ops.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether the index reads persisted rows directly and never needs a rebuild
    fn is_persistent(&self) -> bool;

    /// Add or replace the vector for an entry id
    async fn insert(&self, item: IndexedVector) -> Result<(), DomainError>;

    /// Top `limit` non-expired candidates of the query type by ascending distance
    ///
    /// Candidates tied with the last one at the cut-off must either all be
    /// returned or be ordered by access count then creation time, newest first.
    async fn search(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>, DomainError>;

    /// Drop an entry id; unknown ids are ignored
    async fn remove(&self, id: &str) -> Result<(), DomainError>;

    /// Number of indexed vectors
    async fn len(&self) -> Result<usize, DomainError>;
}
