//! Semantic result caching service
//!
//! Orchestrates the exact-match path, the similarity index and the store into
//! hit/miss decisions, and owns the background expiry/eviction loop. Failures
//! that only cost an optimization (index down, store slow, provider errors)
//! degrade lookups to a miss; caller mistakes are returned as errors.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::key_locks::KeyLocks;
use super::maintenance::{spawn_maintenance, MaintenanceReport};
use crate::domain::embedding::{cosine_similarity, EmbeddingProvider};
use crate::domain::semantic_cache::{
    query_hash, validate_query_type, CacheCounters, CacheEntry, CacheHit, CacheStatsReport,
    CacheStore, IndexQuery, LookupOutcome, LookupRequest, SemanticCacheConfig, SimilarMatch,
    SimilarityIndex, StoreRequest, WarmEntry, WarmOutcome, WarmReport, validate_search_params,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::{
    record_hit_similarity, record_lookup, record_removals, record_store, LookupOutcomeLabel,
};

#[derive(Debug, Default)]
struct Counters {
    lookups: AtomicU64,
    exact_hits: AtomicU64,
    semantic_hits: AtomicU64,
    misses: AtomicU64,
    fail_open: AtomicU64,
    stores: AtomicU64,
    store_failures: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CacheCounters {
        CacheCounters {
            lookups: self.lookups.load(Ordering::Relaxed),
            exact_hits: self.exact_hits.load(Ordering::Relaxed),
            semantic_hits: self.semantic_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fail_open: self.fail_open.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

/// A candidate confirmed against the store, with similarity to the query
struct RankedCandidate {
    entry: CacheEntry,
    similarity: f32,
}

/// Semantic cache service
pub struct SemanticCacheService {
    config: SemanticCacheConfig,
    store: Arc<dyn CacheStore>,
    index: Arc<dyn SimilarityIndex>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    counters: Counters,
    write_locks: KeyLocks,
    detached: Mutex<JoinSet<()>>,
    shutdown_tx: broadcast::Sender<()>,
    maintenance_handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for SemanticCacheService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticCacheService")
            .field("config", &self.config)
            .field("index", &self.index.name())
            .field("embedding_provider", &self.embedding_provider)
            .field("counters", &self.counters)
            .finish()
    }
}

impl SemanticCacheService {
    /// Create a new service over a store and a similarity index
    pub fn new(
        store: Arc<dyn CacheStore>,
        index: Arc<dyn SimilarityIndex>,
        config: SemanticCacheConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            index,
            embedding_provider: None,
            counters: Counters::default(),
            write_locks: KeyLocks::new(),
            detached: Mutex::new(JoinSet::new()),
            shutdown_tx,
            maintenance_handle: Mutex::new(None),
        }
    }

    /// Attach the provider used by text-only lookups
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &SemanticCacheConfig {
        &self.config
    }

    /// Name of the similarity index in use
    pub fn index_name(&self) -> &'static str {
        self.index.name()
    }

    /// Snapshot of the service counters
    pub fn counters(&self) -> CacheCounters {
        self.counters.snapshot()
    }

    /// Check that the backing store is reachable
    pub async fn ping(&self) -> Result<(), DomainError> {
        self.store.ping().await
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<(), DomainError> {
        if embedding.len() != self.config.embedding_dimensions {
            return Err(DomainError::dimension_mismatch(
                self.config.embedding_dimensions,
                embedding.len(),
            ));
        }

        Ok(())
    }

    fn resolve_search_params(
        &self,
        query_type: &str,
        threshold: Option<f32>,
        limit: Option<usize>,
    ) -> Result<(f32, usize), DomainError> {
        let threshold = threshold.unwrap_or_else(|| self.config.threshold_for(query_type));
        let limit = limit.unwrap_or(self.config.search_limit);
        validate_search_params(threshold, limit)?;

        Ok((threshold, limit))
    }

    /// Embed text through the configured provider
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let provider = self.embedding_provider.as_ref().ok_or_else(|| {
            DomainError::validation(
                "An embedding is required because no embedding provider is configured",
            )
        })?;

        let embedding = provider.embed(text).await?;

        if embedding.len() != self.config.embedding_dimensions {
            return Err(DomainError::provider(
                provider.provider_name(),
                format!(
                    "returned {} dimensions, expected {}",
                    embedding.len(),
                    self.config.embedding_dimensions
                ),
            ));
        }

        Ok(embedding)
    }

    /// Decide hit or miss for a query
    ///
    /// A verbatim repeat (same normalized text) is answered from the
    /// exact-match path with similarity 1.0 and never reaches the index.
    /// Otherwise the best non-expired candidate of the same query type is a
    /// hit when its similarity reaches the threshold. Index/store failures,
    /// provider failures and an exhausted search budget all yield `Miss`.
    pub async fn lookup(&self, request: LookupRequest) -> Result<LookupOutcome, DomainError> {
        validate_query_type(&request.query_type)?;

        if let Some(ref embedding) = request.embedding {
            self.check_dimensions(embedding)?;
        }

        let (threshold, limit) =
            self.resolve_search_params(&request.query_type, request.threshold, request.limit)?;
        let budget = request.timeout.unwrap_or_else(|| self.config.search_timeout());
        let query_type = request.query_type.as_str();

        bump(&self.counters.lookups, 1);

        let now = Utc::now();
        let hash = query_hash(query_type, &request.query_text);

        match self.store.find_by_hash(query_type, &hash).await {
            Ok(Some(entry)) if !entry.is_expired_at(now) => {
                return Ok(self.confirm_hit(entry, 1.0, true, now).await);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(query_type, error = %e, "Exact-match lookup failed, skipping cache");
                return Ok(self.fail_open(query_type));
            }
        }

        let embedding = match request.embedding {
            Some(embedding) => embedding,
            None => match self.embed_text(&request.query_text).await {
                Ok(embedding) => embedding,
                Err(e @ DomainError::Validation { .. }) => return Err(e),
                Err(e) => {
                    warn!(query_type, error = %e, "Embedding failed, skipping cache");
                    return Ok(self.fail_open(query_type));
                }
            },
        };

        let search = self.ranked_candidates(query_type, embedding, limit, now);

        match tokio::time::timeout(budget, search).await {
            Ok(Ok(candidates)) => match candidates.into_iter().next() {
                Some(best) if best.similarity >= threshold => {
                    Ok(self.confirm_hit(best.entry, best.similarity, false, now).await)
                }
                best => {
                    debug!(
                        query_type,
                        best_similarity = best.map(|c| c.similarity),
                        threshold,
                        "Semantic cache miss"
                    );
                    bump(&self.counters.misses, 1);
                    record_lookup(query_type, LookupOutcomeLabel::Miss);
                    Ok(LookupOutcome::Miss)
                }
            },
            Ok(Err(e)) => {
                warn!(query_type, error = %e, "Similarity search failed, skipping cache");
                Ok(self.fail_open(query_type))
            }
            Err(_) => {
                warn!(
                    query_type,
                    budget_ms = budget.as_millis() as u64,
                    "Similarity search exceeded its budget, skipping cache"
                );
                Ok(self.fail_open(query_type))
            }
        }
    }

    /// Lookup by text only, embedding through the configured provider
    pub async fn lookup_text(
        &self,
        query_type: &str,
        query_text: &str,
    ) -> Result<LookupOutcome, DomainError> {
        self.lookup(LookupRequest::from_text(query_type, query_text))
            .await
    }

    fn fail_open(&self, query_type: &str) -> LookupOutcome {
        bump(&self.counters.misses, 1);
        bump(&self.counters.fail_open, 1);
        record_lookup(query_type, LookupOutcomeLabel::FailOpen);
        LookupOutcome::Miss
    }

    async fn confirm_hit(
        &self,
        entry: CacheEntry,
        similarity: f32,
        exact: bool,
        now: DateTime<Utc>,
    ) -> LookupOutcome {
        match self.store.record_hit(entry.id(), similarity, now).await {
            Ok(true) => {}
            Ok(false) => debug!(cache_id = entry.id(), "Hit entry was removed concurrently"),
            Err(e) => warn!(cache_id = entry.id(), error = %e, "Failed to record cache hit"),
        }

        let (counter, label) = if exact {
            (&self.counters.exact_hits, LookupOutcomeLabel::ExactHit)
        } else {
            (&self.counters.semantic_hits, LookupOutcomeLabel::SemanticHit)
        };
        bump(counter, 1);
        record_lookup(entry.query_type(), label);
        record_hit_similarity(entry.query_type(), similarity);

        debug!(
            query_type = entry.query_type(),
            cache_id = entry.id(),
            similarity,
            exact,
            "Cache hit"
        );

        LookupOutcome::Hit(CacheHit {
            cache_id: entry.id().to_string(),
            access_count: entry.access_count() + 1,
            result: entry.result,
            result_type: entry.result_type,
            similarity,
            exact,
        })
    }

    /// Search the index and confirm candidates against the store
    ///
    /// Returns live entries of the query type ranked by similarity, then
    /// access count, then recency of creation. Index ids whose row is gone
    /// are pruned from the index.
    async fn ranked_candidates(
        &self,
        query_type: &str,
        embedding: Vec<f32>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankedCandidate>, DomainError> {
        let query = IndexQuery {
            query_type: query_type.to_string(),
            embedding,
            limit,
            now,
        };

        let matches = self.index.search(&query).await?;

        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = matches.iter().map(|m| m.id.clone()).collect();
        let mut entries: HashMap<String, CacheEntry> = self
            .store
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|e| (e.id().to_string(), e))
            .collect();

        let mut candidates = Vec::with_capacity(entries.len());

        for id in ids {
            match entries.remove(&id) {
                Some(entry) if entry.query_type() == query_type && !entry.is_expired_at(now) => {
                    let similarity = cosine_similarity(&query.embedding, entry.embedding());
                    candidates.push(RankedCandidate { entry, similarity });
                }
                Some(_) => {}
                None => {
                    if let Err(e) = self.index.remove(&id).await {
                        debug!(cache_id = %id, error = %e, "Failed to prune stale index entry");
                    }
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.entry.access_count().cmp(&a.entry.access_count()))
                .then_with(|| b.entry.created_at().cmp(&a.entry.created_at()))
        });
        candidates.truncate(limit);

        Ok(candidates)
    }

    /// Ranked matches at or above the threshold; does not count as a hit
    pub async fn find_similar(
        &self,
        query_type: &str,
        embedding: Vec<f32>,
        threshold: Option<f32>,
        limit: Option<usize>,
    ) -> Result<Vec<SimilarMatch>, DomainError> {
        validate_query_type(query_type)?;
        self.check_dimensions(&embedding)?;

        let (threshold, limit) = self.resolve_search_params(query_type, threshold, limit)?;
        let budget = self.config.search_timeout();

        let candidates = tokio::time::timeout(
            budget,
            self.ranked_candidates(query_type, embedding, limit, Utc::now()),
        )
        .await
        .map_err(|_| {
            DomainError::timeout(format!(
                "Similarity search exceeded {}ms",
                budget.as_millis()
            ))
        })??;

        Ok(candidates
            .into_iter()
            .filter(|c| c.similarity >= threshold)
            .map(|c| SimilarMatch {
                cache_id: c.entry.id().to_string(),
                similarity: c.similarity,
                access_count: c.entry.access_count(),
                created_at: c.entry.created_at(),
                result: c.entry.result,
                result_type: c.entry.result_type,
            })
            .collect())
    }

    /// Store a computed result, returning the id of the entry holding it
    ///
    /// A store for a query already cached (same type and normalized text)
    /// refreshes that entry in place and returns its id. Writes to one key
    /// are serialized through the index update, so the index always ends up
    /// holding the embedding of the last row written.
    pub async fn store(&self, request: StoreRequest) -> Result<String, DomainError> {
        validate_query_type(&request.query_type)?;
        self.check_dimensions(&request.embedding)?;

        let ttl = request
            .ttl_seconds
            .or_else(|| self.config.ttl_for(&request.query_type));

        let entry = CacheEntry::new(
            request.query_type,
            request.query_text,
            request.embedding,
            request.result,
            request.result_type,
        )
        .with_compute_time_ms(request.compute_time_ms)
        .with_ttl(ttl);

        let _key = self
            .write_locks
            .lock(entry.query_type(), entry.query_hash())
            .await;

        let outcome = match self.store.upsert(entry.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                bump(&self.counters.store_failures, 1);
                record_store(entry.query_type(), false);
                return Err(e);
            }
        };

        bump(&self.counters.stores, 1);
        record_store(entry.query_type(), true);

        let mut indexed = entry.to_indexed();
        indexed.id = outcome.id.clone();

        if let Err(e) = self.index.insert(indexed).await {
            warn!(
                cache_id = %outcome.id,
                error = %e,
                "Failed to update similarity index; entry stays reachable by exact match"
            );
        }

        debug!(
            query_type = entry.query_type(),
            cache_id = %outcome.id,
            created = outcome.created,
            "Stored cache entry"
        );

        Ok(outcome.id)
    }

    /// Store without waiting; failures are logged and never surfaced
    pub fn store_detached(self: &Arc<Self>, request: StoreRequest) {
        let service = Arc::clone(self);
        let mut tasks = self.detached.lock().unwrap_or_else(|e| e.into_inner());

        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            let query_type = request.query_type.clone();

            if let Err(e) = service.store(request).await {
                warn!(query_type = %query_type, error = %e, "Detached cache store failed");
            }
        });
    }

    /// Pre-populate the cache with known entries
    ///
    /// Entries already validated by hits are never overwritten; unused ones
    /// are refreshed. Invalid entries are counted as failed and skipped.
    pub async fn warm(&self, entries: Vec<WarmEntry>) -> WarmReport {
        let mut report = WarmReport::default();

        for warm in entries {
            if let Err(e) = validate_query_type(&warm.query_type)
                .and_then(|_| self.check_dimensions(&warm.embedding))
            {
                warn!(query_type = %warm.query_type, error = %e, "Rejected warm entry");
                report.failed += 1;
                continue;
            }

            let entry = CacheEntry::new(
                warm.query_type,
                warm.query_text,
                warm.embedding,
                warm.result,
                warm.result_type,
            )
            .with_compute_time_ms(warm.compute_time_ms)
            .warmed();

            let _key = self
                .write_locks
                .lock(entry.query_type(), entry.query_hash())
                .await;

            let id = match self.store.upsert_warm(entry.clone()).await {
                Ok(WarmOutcome::Inserted(id)) => {
                    report.inserted += 1;
                    id
                }
                Ok(WarmOutcome::Refreshed(id)) => {
                    report.refreshed += 1;
                    id
                }
                Ok(WarmOutcome::Skipped(_)) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(query_type = entry.query_type(), error = %e, "Failed to write warm entry");
                    report.failed += 1;
                    continue;
                }
            };

            let mut indexed = entry.to_indexed();
            indexed.id = id;

            if let Err(e) = self.index.insert(indexed).await {
                warn!(error = %e, "Failed to index warm entry");
            }
        }

        info!(
            inserted = report.inserted,
            refreshed = report.refreshed,
            skipped = report.skipped,
            failed = report.failed,
            "Cache warming completed"
        );

        report
    }

    async fn remove_from_index(&self, ids: &[String]) {
        for id in ids {
            if let Err(e) = self.index.remove(id).await {
                debug!(cache_id = %id, error = %e, "Failed to remove entry from index");
            }
        }
    }

    /// Delete every entry that expired before now, in batches
    pub async fn cleanup_expired(&self) -> Result<usize, DomainError> {
        let batch_size = self.config.eviction_batch_size.max(1);
        let now = Utc::now();
        let mut total = 0;

        loop {
            let ids = self.store.delete_expired(now, batch_size).await?;
            self.remove_from_index(&ids).await;
            total += ids.len();

            if ids.len() < batch_size {
                break;
            }

            tokio::task::yield_now().await;
        }

        if total > 0 {
            bump(&self.counters.expirations, total as u64);
            record_removals("expired", total);
            info!(removed = total, "Removed expired cache entries");
        }

        Ok(total)
    }

    /// Evict least recently used entries from every query type over capacity
    ///
    /// Only live entries count toward capacity. Non-warmed entries go first;
    /// warmed entries are only evicted when no other candidate remains.
    pub async fn evict_over_capacity(&self) -> Result<usize, DomainError> {
        let batch_size = self.config.eviction_batch_size.max(1);
        let now = Utc::now();
        let mut counts: Vec<(String, usize)> =
            self.store.count_by_type(now).await?.into_iter().collect();
        counts.sort();

        let mut total = 0;

        for (query_type, count) in counts {
            let max = self.config.max_entries_for(&query_type);
            let mut excess = count.saturating_sub(max);

            while excess > 0 {
                let ids = self
                    .store
                    .eviction_candidates(&query_type, now, excess.min(batch_size))
                    .await?;

                if ids.is_empty() {
                    break;
                }

                let removed = self.store.delete_many(&ids).await?;
                self.remove_from_index(&ids).await;

                if removed == 0 {
                    break;
                }

                total += removed;
                excess = excess.saturating_sub(removed);
                tokio::task::yield_now().await;
            }

            if count > max {
                debug!(query_type = %query_type, count, max, "Evicted over-capacity entries");
            }
        }

        if total > 0 {
            bump(&self.counters.evictions, total as u64);
            record_removals("capacity", total);
            info!(evicted = total, "Evicted cache entries over capacity");
        }

        Ok(total)
    }

    /// One expiry sweep followed by one eviction pass
    pub async fn run_maintenance_pass(&self) -> Result<MaintenanceReport, DomainError> {
        let expired = self.cleanup_expired().await?;
        let evicted = self.evict_over_capacity().await?;

        Ok(MaintenanceReport { expired, evicted })
    }

    /// Aggregate statistics, optionally for one query type
    pub async fn stats(&self, query_type: Option<String>) -> Result<CacheStatsReport, DomainError> {
        if let Some(ref query_type) = query_type {
            validate_query_type(query_type)?;
        }

        let now = Utc::now();
        let horizon = ChronoDuration::from_std(self.config.stats_expiry_horizon())
            .map_err(|e| DomainError::configuration(e.to_string()))?;
        let expiring_before = now + horizon;

        let query_types = self.store.stats(query_type, now, expiring_before).await?;
        let counters = self.counters.snapshot();

        Ok(CacheStatsReport {
            hit_rate: counters.hit_rate(),
            query_types,
            counters,
            expiry_horizon_secs: self.config.stats_expiry_horizon_secs,
        })
    }

    /// Rebuild a non-persistent index from the store and start maintenance
    pub async fn start(self: &Arc<Self>) -> Result<(), DomainError> {
        if !self.index.is_persistent() {
            let vectors = self.store.indexed_vectors(Utc::now()).await?;
            let count = vectors.len();

            for vector in vectors {
                self.index.insert(vector).await?;
            }

            info!(index = self.index.name(), vectors = count, "Similarity index rebuilt");
        }

        self.start_maintenance()
    }

    /// Spawn the background expiry/eviction loop; no-op when already running
    pub fn start_maintenance(self: &Arc<Self>) -> Result<(), DomainError> {
        let interval = self.config.sweep_interval();

        if interval.is_zero() {
            return Err(DomainError::configuration(
                "sweep_interval_secs must be greater than zero",
            ));
        }

        let mut handle = self
            .maintenance_handle
            .lock()
            .map_err(|e| DomainError::internal(format!("Failed to acquire lock: {}", e)))?;

        if handle.is_some() {
            return Ok(());
        }

        *handle = Some(spawn_maintenance(
            Arc::clone(self),
            interval,
            self.shutdown_tx.subscribe(),
        ));

        info!(
            interval_secs = self.config.sweep_interval_secs,
            "Cache maintenance started"
        );

        Ok(())
    }

    /// Whether the maintenance loop is running
    pub fn is_maintenance_running(&self) -> bool {
        self.maintenance_handle
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Stop maintenance and wait for pending detached stores
    pub async fn shutdown(&self) {
        self.shutdown_tx.send(()).ok();

        let handle = self
            .maintenance_handle
            .lock()
            .map(|mut guard| guard.take())
            .unwrap_or(None);

        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let mut pending = {
            let mut tasks = self.detached.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *tasks)
        };

        while pending.join_next().await.is_some() {}

        info!("Semantic cache shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::semantic_cache::{
        IndexMatch, IndexedVector, MockCacheStore, MockSimilarityIndex, QueryTypeConfig,
    };
    use crate::infrastructure::semantic_cache::{BruteForceIndex, InMemoryCacheStore};

    const QT: &str = "creative_score";

    fn config() -> SemanticCacheConfig {
        SemanticCacheConfig::new()
            .with_embedding_dimensions(2)
            .with_similarity_threshold(0.9)
            .with_default_ttl(None)
    }

    fn service_with(config: SemanticCacheConfig) -> (Arc<SemanticCacheService>, Arc<InMemoryCacheStore>) {
        let store = Arc::new(InMemoryCacheStore::new());
        let service = SemanticCacheService::new(store.clone(), Arc::new(BruteForceIndex::new()), config);
        (Arc::new(service), store)
    }

    fn service() -> (Arc<SemanticCacheService>, Arc<InMemoryCacheStore>) {
        service_with(config())
    }

    /// Unit vector whose cosine similarity to [1, 0] is `similarity`
    fn at_similarity(similarity: f32) -> Vec<f32> {
        vec![similarity, (1.0 - similarity * similarity).sqrt()]
    }

    fn store_request(text: &str, embedding: Vec<f32>, result: &str) -> StoreRequest {
        StoreRequest::new(QT, text, embedding, result, "score")
    }

    /// Index that never answers within a short budget
    struct SlowIndex;

    #[async_trait]
    impl SimilarityIndex for SlowIndex {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn is_persistent(&self) -> bool {
            true
        }

        async fn insert(&self, _item: IndexedVector) -> Result<(), DomainError> {
            Ok(())
        }

        async fn search(&self, _query: &IndexQuery) -> Result<Vec<IndexMatch>, DomainError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }

        async fn remove(&self, _id: &str) -> Result<(), DomainError> {
            Ok(())
        }

        async fn len(&self) -> Result<usize, DomainError> {
            Ok(0)
        }
    }

    /// Brute-force index whose inserts of one vector land late
    struct LaggingIndex {
        inner: BruteForceIndex,
        lagging: Vec<f32>,
    }

    impl LaggingIndex {
        fn new(lagging: Vec<f32>) -> Self {
            Self {
                inner: BruteForceIndex::new(),
                lagging,
            }
        }
    }

    #[async_trait]
    impl SimilarityIndex for LaggingIndex {
        fn name(&self) -> &'static str {
            "lagging"
        }

        fn is_persistent(&self) -> bool {
            false
        }

        async fn insert(&self, item: IndexedVector) -> Result<(), DomainError> {
            if item.embedding == self.lagging {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.insert(item).await
        }

        async fn search(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>, DomainError> {
            self.inner.search(query).await
        }

        async fn remove(&self, id: &str) -> Result<(), DomainError> {
            self.inner.remove(id).await
        }

        async fn len(&self) -> Result<usize, DomainError> {
            self.inner.len().await
        }
    }

    fn failing_index() -> MockSimilarityIndex {
        let mut index = MockSimilarityIndex::new();
        index.expect_name().return_const("mock");
        index.expect_insert().returning(|_| Ok(()));
        index
            .expect_search()
            .returning(|_| Err(DomainError::index_unavailable("connection refused")));
        index
    }

    #[tokio::test]
    async fn test_store_then_exact_lookup() {
        let (service, _) = service();
        let id = service
            .store(store_request("Summer sale banner", vec![1.0, 0.0], r#"{"score":0.87}"#))
            .await
            .unwrap();

        let outcome = service
            .lookup(LookupRequest::new(QT, "  summer SALE   banner ", vec![0.0, 1.0]))
            .await
            .unwrap();

        let hit = outcome.into_hit().unwrap();
        assert_eq!(hit.cache_id, id);
        assert!(hit.exact);
        assert_eq!(hit.similarity, 1.0);
        assert_eq!(hit.result, r#"{"score":0.87}"#);
        assert_eq!(hit.access_count, 1);
    }

    #[tokio::test]
    async fn test_exact_match_ignores_threshold() {
        let (service, _) = service();
        service
            .store(store_request("banner", vec![1.0, 0.0], "r"))
            .await
            .unwrap();

        let outcome = service
            .lookup(LookupRequest::new(QT, "banner", vec![0.0, 1.0]).with_threshold(1.0))
            .await
            .unwrap();

        assert!(outcome.hit().unwrap().exact);
    }

    #[tokio::test]
    async fn test_exact_match_never_searches_index() {
        let store = Arc::new(InMemoryCacheStore::new());
        let mut index = MockSimilarityIndex::new();
        index.expect_insert().returning(|_| Ok(()));
        index.expect_search().never();

        let service = SemanticCacheService::new(store, Arc::new(index), config());
        service
            .store(store_request("banner", vec![1.0, 0.0], "r"))
            .await
            .unwrap();

        let outcome = service
            .lookup(LookupRequest::new(QT, "banner", vec![1.0, 0.0]))
            .await
            .unwrap();

        assert!(outcome.is_hit());
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let (service, _) = service();
        service
            .store(store_request("stored query", at_similarity(0.9), "r"))
            .await
            .unwrap();

        let hit = service
            .lookup(LookupRequest::new(QT, "other text", vec![1.0, 0.0]).with_threshold(0.85))
            .await
            .unwrap();
        let hit = hit.into_hit().unwrap();
        assert!(!hit.exact);
        assert!((hit.similarity - 0.9).abs() < 1e-3);

        let miss = service
            .lookup(LookupRequest::new(QT, "other text", vec![1.0, 0.0]).with_threshold(0.95))
            .await
            .unwrap();
        assert_eq!(miss, LookupOutcome::Miss);
    }

    #[tokio::test]
    async fn test_semantic_hit_updates_usage() {
        let (service, store) = service();
        let id = service
            .store(store_request("stored query", at_similarity(0.95), "r"))
            .await
            .unwrap();

        for similarity in [0.95f32, 0.95] {
            let hit = service
                .lookup(LookupRequest::new(QT, "paraphrase", vec![1.0, 0.0]))
                .await
                .unwrap()
                .into_hit()
                .unwrap();
            assert!((hit.similarity - similarity).abs() < 1e-3);
        }

        let entry = store.get(&id).await.unwrap().unwrap();
        assert_eq!(entry.access_count(), 2);
        assert!(entry.last_accessed_at().is_some());
        assert!((entry.avg_similarity_on_hit() - 0.95).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_lookup_scoped_to_query_type() {
        let (service, _) = service();
        service
            .store(StoreRequest::new("ctr_prediction", "banner", vec![1.0, 0.0], "r", "ctr"))
            .await
            .unwrap();

        let outcome = service
            .lookup(LookupRequest::new(QT, "banner", vec![1.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(outcome, LookupOutcome::Miss);
    }

    #[tokio::test]
    async fn test_empty_cache_is_miss() {
        let (service, _) = service();

        let outcome = service
            .lookup(LookupRequest::new(QT, "anything", vec![1.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(outcome, LookupOutcome::Miss);
        let counters = service.counters();
        assert_eq!(counters.lookups, 1);
        assert_eq!(counters.misses, 1);
        assert_eq!(counters.fail_open, 0);
    }

    #[tokio::test]
    async fn test_idempotent_store() {
        let (service, store) = service();
        let first = service
            .store(store_request("banner", vec![1.0, 0.0], "old"))
            .await
            .unwrap();
        let second = service
            .store(store_request("Banner", vec![0.6, 0.8], "new"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count_by_type(Utc::now()).await.unwrap()[QT], 1);

        let hit = service
            .lookup(LookupRequest::new(QT, "banner", vec![1.0, 0.0]))
            .await
            .unwrap()
            .into_hit()
            .unwrap();
        assert_eq!(hit.result, "new");

        // The index follows the refreshed embedding
        let similar = service
            .find_similar(QT, vec![0.6, 0.8], Some(0.99), None)
            .await
            .unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].cache_id, first);
    }

    #[tokio::test]
    async fn test_concurrent_stores_collapse() {
        let (service, store) = service();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .store(store_request("same query", vec![1.0, 0.0], &format!("r{}", i)))
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }

        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.count_by_type(Utc::now()).await.unwrap()[QT], 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let (service, store) = service();
        let id = service
            .store(store_request("short lived", vec![1.0, 0.0], "r").with_ttl_seconds(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let exact = service
            .lookup(LookupRequest::new(QT, "short lived", vec![1.0, 0.0]))
            .await
            .unwrap();
        let semantic = service
            .lookup(LookupRequest::new(QT, "different", vec![1.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(exact, LookupOutcome::Miss);
        assert_eq!(semantic, LookupOutcome::Miss);
        assert_eq!(store.get(&id).await.unwrap().unwrap().access_count(), 0);

        assert_eq!(service.cleanup_expired().await.unwrap(), 1);
        assert!(store.get(&id).await.unwrap().is_none());
        assert_eq!(service.counters().expirations, 1);
    }

    #[tokio::test]
    async fn test_configured_ttl_applies() {
        let config = config().with_query_type(
            QT,
            QueryTypeConfig {
                ttl_secs: Some(600),
                ..Default::default()
            },
        );
        let (service, store) = service_with(config);

        let id = service
            .store(store_request("banner", vec![1.0, 0.0], "r"))
            .await
            .unwrap();
        let entry = store.get(&id).await.unwrap().unwrap();

        assert_eq!(entry.ttl_seconds(), Some(600));
        assert!(entry.expires_at().is_some());
    }

    #[tokio::test]
    async fn test_zero_default_ttl_stores_without_expiry() {
        let config = config().with_default_ttl(Some(Duration::ZERO));
        let (service, store) = service_with(config);

        let id = service
            .store(store_request("banner", vec![1.0, 0.0], "r"))
            .await
            .unwrap();
        let entry = store.get(&id).await.unwrap().unwrap();

        assert_eq!(entry.ttl_seconds(), None);
        assert!(entry.expires_at().is_none());
    }

    #[tokio::test]
    async fn test_capacity_eviction_removes_least_recently_used() {
        let config = config().with_query_type(
            QT,
            QueryTypeConfig {
                max_entries: Some(3),
                ..Default::default()
            },
        );
        let (service, store) = service_with(config);

        let mut ids = Vec::new();
        for i in 0..4 {
            let angle = i as f32 * 0.3;
            ids.push(
                service
                    .store(store_request(&format!("query {}", i), vec![angle.cos(), angle.sin()], "r"))
                    .await
                    .unwrap(),
            );
        }

        // Touch every entry except ids[1]
        for (i, id) in ids.iter().enumerate() {
            if i != 1 {
                store.record_hit(id, 1.0, Utc::now()).await.unwrap();
            }
        }

        assert_eq!(service.evict_over_capacity().await.unwrap(), 1);
        assert_eq!(store.count_by_type(Utc::now()).await.unwrap()[QT], 3);
        assert!(store.get(&ids[1]).await.unwrap().is_none());
        assert_eq!(service.counters().evictions, 1);

        // Evicted entries no longer surface from the index
        let similar = service
            .find_similar(QT, vec![0.3f32.cos(), 0.3f32.sin()], Some(0.999), None)
            .await
            .unwrap();
        assert!(similar.iter().all(|m| m.cache_id != ids[1]));
    }

    #[tokio::test]
    async fn test_eviction_spares_warmed_entries() {
        let config = config().with_max_entries_per_type(1);
        let (service, store) = service_with(config);

        service
            .warm(vec![WarmEntry::new(QT, "warm", vec![1.0, 0.0], "w", "score")])
            .await;
        let organic = service
            .store(store_request("organic", vec![0.0, 1.0], "o"))
            .await
            .unwrap();

        assert_eq!(service.evict_over_capacity().await.unwrap(), 1);
        assert!(store.get(&organic).await.unwrap().is_none());
        assert!(service
            .lookup(LookupRequest::new(QT, "warm", vec![1.0, 0.0]))
            .await
            .unwrap()
            .is_hit());
    }

    #[tokio::test]
    async fn test_warmed_entries_evicted_when_no_other_candidate() {
        let config = config().with_max_entries_per_type(1);
        let (service, store) = service_with(config);

        let report = service
            .warm(vec![
                WarmEntry::new(QT, "first", vec![1.0, 0.0], "a", "score"),
                WarmEntry::new(QT, "second", vec![0.0, 1.0], "b", "score"),
            ])
            .await;
        assert_eq!(report.inserted, 2);

        assert_eq!(service.evict_over_capacity().await.unwrap(), 1);
        assert_eq!(store.count_by_type(Utc::now()).await.unwrap()[QT], 1);
        assert_eq!(service.counters().evictions, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_do_not_count_toward_capacity() {
        let config = config().with_query_type(
            QT,
            QueryTypeConfig {
                max_entries: Some(2),
                ..Default::default()
            },
        );
        let (service, store) = service_with(config);

        let first = service
            .store(store_request("first", vec![1.0, 0.0], "a"))
            .await
            .unwrap();
        let second = service
            .store(store_request("second", vec![0.0, 1.0], "b"))
            .await
            .unwrap();

        let mut dead = CacheEntry::new(QT, "dead", vec![0.6, 0.8], "d", "score");
        dead.expires_at = Some(Utc::now() - ChronoDuration::seconds(10));
        store.upsert(dead).await.unwrap();

        assert_eq!(service.evict_over_capacity().await.unwrap(), 0);
        assert!(store.get(&first).await.unwrap().is_some());
        assert!(store.get(&second).await.unwrap().is_some());

        assert_eq!(service.cleanup_expired().await.unwrap(), 1);
        assert_eq!(store.count_by_type(Utc::now()).await.unwrap()[QT], 2);
    }

    #[tokio::test]
    async fn test_warm_protects_validated_entries() {
        let (service, _) = service();
        service
            .store(store_request("banner", vec![1.0, 0.0], "organic"))
            .await
            .unwrap();
        service
            .lookup(LookupRequest::new(QT, "banner", vec![1.0, 0.0]))
            .await
            .unwrap();

        let report = service
            .warm(vec![
                WarmEntry::new(QT, "banner", vec![1.0, 0.0], "warmed", "score"),
                WarmEntry::new(QT, "new query", vec![0.0, 1.0], "warmed", "score"),
                WarmEntry::new(QT, "bad dims", vec![1.0], "warmed", "score"),
                WarmEntry::new("Bad Type", "x", vec![1.0, 0.0], "warmed", "score"),
            ])
            .await;

        assert_eq!(
            report,
            WarmReport {
                inserted: 1,
                refreshed: 0,
                skipped: 1,
                failed: 2,
            }
        );

        let hit = service
            .lookup(LookupRequest::new(QT, "banner", vec![1.0, 0.0]))
            .await
            .unwrap()
            .into_hit()
            .unwrap();
        assert_eq!(hit.result, "organic");
    }

    #[tokio::test]
    async fn test_warm_refreshes_unused_entries() {
        let (service, store) = service();
        let id = service
            .store(store_request("banner", vec![1.0, 0.0], "organic").with_ttl_seconds(60))
            .await
            .unwrap();

        let report = service
            .warm(vec![WarmEntry::new(QT, "banner", vec![1.0, 0.0], "warmed", "score")])
            .await;

        assert_eq!(report.refreshed, 1);
        let entry = store.get(&id).await.unwrap().unwrap();
        assert!(entry.is_warmed());
        assert!(entry.expires_at().is_none());
        assert_eq!(entry.result(), "warmed");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_error() {
        let (service, _) = service();

        let store_err = service
            .store(store_request("banner", vec![1.0, 0.0, 0.0], "r"))
            .await
            .unwrap_err();
        assert!(matches!(
            store_err,
            DomainError::DimensionMismatch { expected: 2, actual: 3 }
        ));

        let lookup_err = service
            .lookup(LookupRequest::new(QT, "banner", vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(lookup_err, DomainError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_invalid_parameters_are_errors() {
        let (service, _) = service();

        let bad_type = service
            .lookup(LookupRequest::new("Creative Score", "banner", vec![1.0, 0.0]))
            .await;
        assert!(matches!(bad_type, Err(DomainError::Validation { .. })));

        let bad_threshold = service
            .lookup(LookupRequest::new(QT, "banner", vec![1.0, 0.0]).with_threshold(1.5))
            .await;
        assert!(matches!(bad_threshold, Err(DomainError::Validation { .. })));

        let bad_limit = service
            .find_similar(QT, vec![1.0, 0.0], None, Some(0))
            .await;
        assert!(matches!(bad_limit, Err(DomainError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_index_failure_degrades_to_exact_only() {
        let store = Arc::new(InMemoryCacheStore::new());
        let service = SemanticCacheService::new(store, Arc::new(failing_index()), config());

        service
            .store(store_request("banner", vec![1.0, 0.0], "r"))
            .await
            .unwrap();

        let exact = service
            .lookup(LookupRequest::new(QT, "banner", vec![1.0, 0.0]))
            .await
            .unwrap();
        assert!(exact.is_hit());

        let semantic = service
            .lookup(LookupRequest::new(QT, "banner ad", vec![1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(semantic, LookupOutcome::Miss);
        assert_eq!(service.counters().fail_open, 1);
    }

    #[tokio::test]
    async fn test_store_failure_fails_open_on_lookup() {
        let mut store = MockCacheStore::new();
        store
            .expect_find_by_hash()
            .returning(|_, _| Err(DomainError::storage("connection reset")));
        let mut index = MockSimilarityIndex::new();
        index.expect_search().never();

        let service = SemanticCacheService::new(Arc::new(store), Arc::new(index), config());

        let outcome = service
            .lookup(LookupRequest::new(QT, "banner", vec![1.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(outcome, LookupOutcome::Miss);
        assert_eq!(service.counters().fail_open, 1);
    }

    #[tokio::test]
    async fn test_record_hit_failure_still_returns_hit() {
        let entry = CacheEntry::new(QT, "banner", vec![1.0, 0.0], "r", "score");
        let mut store = MockCacheStore::new();
        store
            .expect_find_by_hash()
            .returning(move |_, _| Ok(Some(entry.clone())));
        store
            .expect_record_hit()
            .returning(|_, _, _| Err(DomainError::storage("read only")));

        let service =
            SemanticCacheService::new(Arc::new(store), Arc::new(BruteForceIndex::new()), config());

        let outcome = service
            .lookup(LookupRequest::new(QT, "banner", vec![1.0, 0.0]))
            .await
            .unwrap();

        assert!(outcome.is_hit());
    }

    #[tokio::test]
    async fn test_search_budget_exceeded_is_miss() {
        let store = Arc::new(InMemoryCacheStore::new());
        let service = SemanticCacheService::new(store, Arc::new(SlowIndex), config());

        let outcome = service
            .lookup(
                LookupRequest::new(QT, "banner", vec![1.0, 0.0])
                    .with_timeout(Duration::from_millis(20)),
            )
            .await
            .unwrap();

        assert_eq!(outcome, LookupOutcome::Miss);
        assert_eq!(service.counters().fail_open, 1);

        let similar = service.find_similar(QT, vec![1.0, 0.0], None, None).await;
        assert!(similar.is_err());
    }

    #[tokio::test]
    async fn test_lookup_text_embeds_through_provider() {
        let provider = MockEmbeddingProvider::new("mock", 2)
            .with_vector("stored", vec![1.0, 0.0])
            .with_vector("paraphrase", at_similarity(0.96));
        let (service, _) = service();
        let service = Arc::try_unwrap(service)
            .unwrap()
            .with_embedding_provider(Arc::new(provider));

        let vector = service.embed_text("stored").await.unwrap();
        service
            .store(store_request("stored", vector, "r"))
            .await
            .unwrap();

        let outcome = service.lookup_text(QT, "paraphrase").await.unwrap();
        let hit = outcome.into_hit().unwrap();
        assert!(!hit.exact);
        assert!((hit.similarity - 0.96).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_provider_failure_fails_open() {
        let store = Arc::new(InMemoryCacheStore::new());
        let service =
            SemanticCacheService::new(store, Arc::new(BruteForceIndex::new()), config())
                .with_embedding_provider(Arc::new(
                    MockEmbeddingProvider::new("mock", 2).with_error("rate limited"),
                ));

        let outcome = service.lookup_text(QT, "banner").await.unwrap();

        assert_eq!(outcome, LookupOutcome::Miss);
        assert_eq!(service.counters().fail_open, 1);
    }

    #[tokio::test]
    async fn test_provider_dimension_drift_fails_open() {
        let store = Arc::new(InMemoryCacheStore::new());
        let service =
            SemanticCacheService::new(store, Arc::new(BruteForceIndex::new()), config())
                .with_embedding_provider(Arc::new(MockEmbeddingProvider::new("mock", 8)));

        let outcome = service.lookup_text(QT, "banner").await.unwrap();
        assert_eq!(outcome, LookupOutcome::Miss);
    }

    #[tokio::test]
    async fn test_text_lookup_without_provider_is_error() {
        let (service, _) = service();

        let result = service.lookup_text(QT, "banner").await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_text_lookup_exact_hit_skips_provider() {
        let (service, _) = service();
        let service = Arc::try_unwrap(service).unwrap().with_embedding_provider(Arc::new(
            MockEmbeddingProvider::new("mock", 2).with_error("should not be called"),
        ));

        service
            .store(store_request("banner", vec![1.0, 0.0], "r"))
            .await
            .unwrap();

        let outcome = service.lookup_text(QT, "BANNER").await.unwrap();
        assert!(outcome.hit().unwrap().exact);
        assert_eq!(service.counters().fail_open, 0);
    }

    #[tokio::test]
    async fn test_find_similar_ranks_and_does_not_count_hits() {
        let (service, store) = service();
        let high = service
            .store(store_request("a", at_similarity(0.99), "a"))
            .await
            .unwrap();
        let mid = service
            .store(store_request("b", at_similarity(0.93), "b"))
            .await
            .unwrap();
        service
            .store(store_request("c", at_similarity(0.5), "c"))
            .await
            .unwrap();

        let matches = service
            .find_similar(QT, vec![1.0, 0.0], Some(0.9), Some(5))
            .await
            .unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].cache_id, high);
        assert_eq!(matches[1].cache_id, mid);
        assert!(matches[0].similarity >= matches[1].similarity);
        assert_eq!(store.get(&high).await.unwrap().unwrap().access_count(), 0);
    }

    #[tokio::test]
    async fn test_ties_prefer_more_accessed_entries() {
        let (service, store) = service();
        let cold = service
            .store(store_request("cold", vec![1.0, 0.0], "cold"))
            .await
            .unwrap();
        let hot = service
            .store(store_request("hot", vec![1.0, 0.0], "hot"))
            .await
            .unwrap();
        store.record_hit(&hot, 1.0, Utc::now()).await.unwrap();

        let matches = service
            .find_similar(QT, vec![1.0, 0.0], None, None)
            .await
            .unwrap();

        assert_eq!(matches[0].cache_id, hot);
        assert_eq!(matches[1].cache_id, cold);
    }

    #[tokio::test]
    async fn test_ties_prefer_more_accessed_entries_with_limit_one() {
        let (service, store) = service();
        let cold = service
            .store(store_request("cold", vec![1.0, 0.0], "cold"))
            .await
            .unwrap();
        let hot = service
            .store(store_request("hot", vec![1.0, 0.0], "hot"))
            .await
            .unwrap();

        for _ in 0..5 {
            store.record_hit(&hot, 1.0, Utc::now()).await.unwrap();
        }

        for _ in 0..20 {
            let hit = service
                .lookup(LookupRequest::new(QT, "paraphrase", vec![1.0, 0.0]).with_limit(1))
                .await
                .unwrap()
                .into_hit()
                .unwrap();
            assert_eq!(hit.cache_id, hot);
        }

        assert_eq!(store.get(&cold).await.unwrap().unwrap().access_count(), 0);
    }

    #[tokio::test]
    async fn test_ties_with_equal_usage_prefer_newest() {
        let (service, _) = service();
        service
            .store(store_request("older", vec![1.0, 0.0], "older"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let newer = service
            .store(store_request("newer", vec![1.0, 0.0], "newer"))
            .await
            .unwrap();

        let hit = service
            .lookup(LookupRequest::new(QT, "paraphrase", vec![1.0, 0.0]).with_limit(1))
            .await
            .unwrap()
            .into_hit()
            .unwrap();

        assert_eq!(hit.cache_id, newer);
    }

    #[tokio::test]
    async fn test_racing_stores_leave_index_matching_row() {
        let store = Arc::new(InMemoryCacheStore::new());
        let index = Arc::new(LaggingIndex::new(vec![1.0, 0.0]));
        let service = SemanticCacheService::new(store.clone(), index, config());

        // Below the 0.9 threshold for [0, 1]
        service
            .store(store_request("neighbour", vec![0.6, 0.8], "n"))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            service.store(store_request("banner", vec![1.0, 0.0], "a")),
            service.store(store_request("Banner", vec![0.0, 1.0], "b")),
        );
        let id = first.unwrap();
        assert_eq!(second.unwrap(), id);

        let row = store.get(&id).await.unwrap().unwrap();
        assert_eq!(row.embedding(), &[0.0, 1.0]);
        assert_eq!(row.result(), "b");

        let hit = service
            .lookup(LookupRequest::new(QT, "other text", vec![0.0, 1.0]).with_limit(1))
            .await
            .unwrap()
            .into_hit()
            .unwrap();

        assert_eq!(hit.cache_id, id);
        assert!((hit.similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_stale_index_ids_are_ignored() {
        let (service, store) = service();
        let id = service
            .store(store_request("banner", vec![1.0, 0.0], "r"))
            .await
            .unwrap();
        store.delete_many(&[id]).await.unwrap();

        let outcome = service
            .lookup(LookupRequest::new(QT, "other", vec![1.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(outcome, LookupOutcome::Miss);
        assert_eq!(service.counters().fail_open, 0);
    }

    #[tokio::test]
    async fn test_stats_report() {
        let (service, _) = service();
        service
            .store(store_request("a", vec![1.0, 0.0], "r").with_compute_time_ms(200))
            .await
            .unwrap();
        service
            .store(store_request("b", vec![0.0, 1.0], "r").with_compute_time_ms(400))
            .await
            .unwrap();
        service
            .lookup(LookupRequest::new(QT, "a", vec![1.0, 0.0]))
            .await
            .unwrap();

        let report = service.stats(None).await.unwrap();

        assert_eq!(report.query_types.len(), 1);
        let stats = &report.query_types[0];
        assert_eq!(stats.entry_count, 2);
        assert!((stats.avg_compute_time_ms - 300.0).abs() < 1e-9);
        assert!((stats.unused_fraction - 0.5).abs() < 1e-9);
        assert_eq!(report.counters.exact_hits, 1);
        assert_eq!(report.hit_rate, 1.0);

        assert!(service.stats(Some("bad type".into())).await.is_err());
    }

    #[tokio::test]
    async fn test_store_detached_completes_before_shutdown() {
        let (service, store) = service();

        service.store_detached(store_request("banner", vec![1.0, 0.0], "r"));
        service.store_detached(store_request("bad", vec![1.0], "r"));
        service.shutdown().await;

        assert_eq!(store.count_by_type(Utc::now()).await.unwrap()[QT], 1);
        assert_eq!(service.counters().stores, 1);
    }

    #[tokio::test]
    async fn test_start_rebuilds_index_and_runs_maintenance() {
        let store = Arc::new(InMemoryCacheStore::new());
        store
            .upsert(CacheEntry::new(QT, "persisted", vec![1.0, 0.0], "r", "score"))
            .await
            .unwrap();

        let index = Arc::new(BruteForceIndex::new());
        let service = Arc::new(SemanticCacheService::new(
            store,
            index.clone(),
            config().with_sweep_interval(Duration::from_secs(1)),
        ));

        service.start().await.unwrap();
        assert!(service.is_maintenance_running());
        assert_eq!(index.len().await.unwrap(), 1);

        let outcome = service
            .lookup(LookupRequest::new(QT, "something else", vec![1.0, 0.0]))
            .await
            .unwrap();
        assert!(outcome.is_hit());

        service.shutdown().await;
        assert!(!service.is_maintenance_running());
    }

    #[tokio::test]
    async fn test_maintenance_pass_reports_counts() {
        let config = config().with_max_entries_per_type(1);
        let (service, _) = service_with(config);

        service
            .store(store_request("a", vec![1.0, 0.0], "r"))
            .await
            .unwrap();
        service
            .store(store_request("b", vec![0.0, 1.0], "r").with_ttl_seconds(0))
            .await
            .unwrap();
        service
            .store(store_request("c", vec![0.6, 0.8], "r"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let report = service.run_maintenance_pass().await.unwrap();
        assert_eq!(report, MaintenanceReport { expired: 1, evicted: 1 });
    }
}
