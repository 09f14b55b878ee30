//! In-memory cache store implementation

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::semantic_cache::{
    CacheEntry, CacheStore, IndexedVector, QueryTypeStats, UpsertOutcome, WarmOutcome,
};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<String, CacheEntry>,
    /// `(query_type, query_hash)` -> id
    by_hash: HashMap<(String, String), String>,
}

impl StoreState {
    fn key(entry: &CacheEntry) -> (String, String) {
        (entry.query_type().to_string(), entry.query_hash().to_string())
    }

    fn remove(&mut self, id: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(id)?;
        self.by_hash.remove(&Self::key(&entry));
        Some(entry)
    }

    fn insert(&mut self, entry: CacheEntry) -> String {
        let id = entry.id().to_string();
        self.by_hash.insert(Self::key(&entry), id.clone());
        self.entries.insert(id.clone(), entry);
        id
    }
}

/// In-memory cache store
///
/// Suitable for development, tests and single-process deployments. All
/// mutations happen under one write lock, which makes every upsert atomic.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    state: RwLock<StoreState>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, DomainError> {
        self.state
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, DomainError> {
        self.state
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, DomainError> {
        let mut state = self.write()?;

        if let Some(id) = state.by_hash.get(&StoreState::key(&entry)).cloned() {
            if let Some(existing) = state.entries.get_mut(&id) {
                existing.refresh_from(&entry);
                return Ok(UpsertOutcome { id, created: false });
            }
        }

        let id = state.insert(entry);
        Ok(UpsertOutcome { id, created: true })
    }

    async fn upsert_warm(&self, entry: CacheEntry) -> Result<WarmOutcome, DomainError> {
        let mut state = self.write()?;

        if let Some(id) = state.by_hash.get(&StoreState::key(&entry)).cloned() {
            if let Some(existing) = state.entries.get_mut(&id) {
                if existing.access_count() > 0 {
                    return Ok(WarmOutcome::Skipped(id));
                }

                existing.refresh_from(&entry);
                return Ok(WarmOutcome::Refreshed(id));
            }
        }

        Ok(WarmOutcome::Inserted(state.insert(entry)))
    }

    async fn get(&self, id: &str) -> Result<Option<CacheEntry>, DomainError> {
        Ok(self.read()?.entries.get(id).cloned())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<CacheEntry>, DomainError> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.entries.get(id).cloned())
            .collect())
    }

    async fn find_by_hash(
        &self,
        query_type: &str,
        query_hash: &str,
    ) -> Result<Option<CacheEntry>, DomainError> {
        let state = self.read()?;
        let key = (query_type.to_string(), query_hash.to_string());

        Ok(state
            .by_hash
            .get(&key)
            .and_then(|id| state.entries.get(id))
            .cloned())
    }

    async fn record_hit(
        &self,
        id: &str,
        similarity: f32,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let mut state = self.write()?;

        match state.entries.get_mut(id) {
            Some(entry) => {
                entry.record_hit(similarity, at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, DomainError> {
        let mut state = self.write()?;

        let expired: Vec<String> = state
            .entries
            .values()
            .filter(|e| e.expires_at().is_some_and(|at| at < now))
            .take(limit)
            .map(|e| e.id().to_string())
            .collect();

        for id in &expired {
            state.remove(id);
        }

        Ok(expired)
    }

    async fn count_by_type(
        &self,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, usize>, DomainError> {
        let state = self.read()?;
        let mut counts = HashMap::new();

        for entry in state.entries.values().filter(|e| !e.is_expired_at(now)) {
            *counts.entry(entry.query_type().to_string()).or_insert(0) += 1;
        }

        Ok(counts)
    }

    async fn eviction_candidates(
        &self,
        query_type: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, DomainError> {
        let state = self.read()?;

        let mut candidates: Vec<&CacheEntry> = state
            .entries
            .values()
            .filter(|e| e.query_type() == query_type && !e.is_expired_at(now))
            .collect();

        candidates.sort_by(|a, b| {
            a.is_warmed()
                .cmp(&b.is_warmed())
                .then_with(|| a.recency().cmp(&b.recency()))
                .then_with(|| a.id().cmp(b.id()))
        });

        Ok(candidates
            .into_iter()
            .take(limit)
            .map(|e| e.id().to_string())
            .collect())
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, DomainError> {
        let mut state = self.write()?;
        Ok(ids.iter().filter(|id| state.remove(id).is_some()).count())
    }

    async fn stats(
        &self,
        query_type: Option<String>,
        now: DateTime<Utc>,
        expiring_before: DateTime<Utc>,
    ) -> Result<Vec<QueryTypeStats>, DomainError> {
        let state = self.read()?;
        let mut grouped: HashMap<&str, Vec<&CacheEntry>> = HashMap::new();

        for entry in state.entries.values() {
            if query_type.as_deref().is_some_and(|t| t != entry.query_type()) {
                continue;
            }
            grouped.entry(entry.query_type()).or_default().push(entry);
        }

        let mut stats: Vec<QueryTypeStats> = grouped
            .into_iter()
            .map(|(name, entries)| {
                QueryTypeStats::from_entries(name, entries, now, expiring_before)
            })
            .filter(|s| s.entry_count > 0)
            .collect();

        stats.sort_by(|a, b| a.query_type.cmp(&b.query_type));
        Ok(stats)
    }

    async fn indexed_vectors(&self, now: DateTime<Utc>) -> Result<Vec<IndexedVector>, DomainError> {
        Ok(self
            .read()?
            .entries
            .values()
            .filter(|e| !e.is_expired_at(now))
            .map(CacheEntry::to_indexed)
            .collect())
    }

    async fn ping(&self) -> Result<(), DomainError> {
        self.read().map(|_| ())
    }
}
