//! Cache store trait

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CacheEntry, IndexedVector, QueryTypeStats};
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Result of an upsert keyed by `(query_type, query_hash)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Id of the stored entry (the existing id when the hash was already present)
    pub id: String,
    /// Whether a new entry was created
    pub created: bool,
}

/// Result of writing a warmed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmOutcome {
    /// No entry existed for the hash
    Inserted(String),
    /// An unused entry existed and was overwritten
    Refreshed(String),
    /// An entry with hits already exists and was left untouched
    Skipped(String),
}

/// Durable keyed storage of cache entries
///
/// Every write that touches a `(query_type, query_hash)` key must be a single
/// atomic upsert so racing writers converge to one well-formed entry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Insert the entry, or refresh the payload of the entry with the same hash
    async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, DomainError>;

    /// Insert a warmed entry unless an entry with the same hash has been hit
    async fn upsert_warm(&self, entry: CacheEntry) -> Result<WarmOutcome, DomainError>;

    /// Get an entry by id, expired or not
    async fn get(&self, id: &str) -> Result<Option<CacheEntry>, DomainError>;

    /// Get several entries by id; missing ids are skipped
    async fn get_many(&self, ids: &[String]) -> Result<Vec<CacheEntry>, DomainError>;

    /// Exact-match lookup, expired or not
    async fn find_by_hash(
        &self,
        query_type: &str,
        query_hash: &str,
    ) -> Result<Option<CacheEntry>, DomainError>;

    /// Apply a confirmed hit to the entry; returns false if the entry is gone
    async fn record_hit(
        &self,
        id: &str,
        similarity: f32,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError>;

    /// Delete up to `limit` entries that expired before `now`, returning their ids
    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, DomainError>;

    /// Number of entries per query type that are still live at `now`
    async fn count_by_type(
        &self,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, usize>, DomainError>;

    /// Up to `limit` ids of live entries of a query type in eviction order:
    /// non-warmed before warmed, then least recently used first
    async fn eviction_candidates(
        &self,
        query_type: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, DomainError>;

    /// Delete entries by id, returning how many were removed
    async fn delete_many(&self, ids: &[String]) -> Result<usize, DomainError>;

    /// Aggregate statistics, optionally restricted to one query type
    async fn stats(
        &self,
        query_type: Option<String>,
        now: DateTime<Utc>,
        expiring_before: DateTime<Utc>,
    ) -> Result<Vec<QueryTypeStats>, DomainError>;

    /// Every non-expired vector, used to rebuild an in-process index
    async fn indexed_vectors(&self, now: DateTime<Utc>) -> Result<Vec<IndexedVector>, DomainError>;

    /// Connectivity check
    async fn ping(&self) -> Result<(), DomainError>;
}
