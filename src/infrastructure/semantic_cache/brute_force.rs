//! Linear-scan similarity index

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::embedding::cosine_distance;
use crate::domain::semantic_cache::{IndexMatch, IndexQuery, IndexedVector, SimilarityIndex};
use crate::domain::DomainError;

/// Distances closer than this are treated as a tie at the cut-off
const TIE_EPSILON: f32 = 1e-6;

#[derive(Debug)]
struct Slot {
    embedding: Vec<f32>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct IndexState {
    /// query_type -> id -> vector
    partitions: HashMap<String, HashMap<String, Slot>>,
    /// id -> query_type
    owners: HashMap<String, String>,
}

/// In-process index that scores every vector of the requested query type
///
/// Exact, with search cost linear in the partition size. Rebuilt from the
/// store on startup.
#[derive(Debug, Default)]
pub struct BruteForceIndex {
    state: RwLock<IndexState>,
}

impl BruteForceIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SimilarityIndex for BruteForceIndex {
    fn name(&self) -> &'static str {
        "brute_force"
    }

    fn is_persistent(&self) -> bool {
        false
    }

    async fn insert(&self, item: IndexedVector) -> Result<(), DomainError> {
        let mut state = self.state.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;

        // An id never changes type, but drop any stale slot before re-inserting
        if let Some(previous) = state.owners.remove(&item.id) {
            if let Some(partition) = state.partitions.get_mut(&previous) {
                partition.remove(&item.id);
            }
        }

        state.owners.insert(item.id.clone(), item.query_type.clone());
        state.partitions.entry(item.query_type).or_default().insert(
            item.id,
            Slot {
                embedding: item.embedding,
                expires_at: item.expires_at,
            },
        );

        Ok(())
    }

    async fn search(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>, DomainError> {
        let state = self.state.read().map_err(|e| {
            DomainError::internal(format!("Failed to acquire read lock: {}", e))
        })?;

        let Some(partition) = state.partitions.get(&query.query_type) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<IndexMatch> = partition
            .iter()
            .filter(|(_, slot)| slot.expires_at.is_none_or(|at| at > query.now))
            .map(|(id, slot)| IndexMatch::new(id.clone(), cosine_distance(&query.embedding, &slot.embedding)))
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        // Keep everything tied with the last slot so callers can rank by usage
        let keep = match query.limit.checked_sub(1).and_then(|last| matches.get(last)) {
            Some(last) => {
                let cutoff = last.distance + TIE_EPSILON;
                matches.partition_point(|m| m.distance <= cutoff)
            }
            None => query.limit.min(matches.len()),
        };
        matches.truncate(keep);

        Ok(matches)
    }

    async fn remove(&self, id: &str) -> Result<(), DomainError> {
        let mut state = self.state.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;

        if let Some(query_type) = state.owners.remove(id) {
            if let Some(partition) = state.partitions.get_mut(&query_type) {
                partition.remove(id);
            }
        }

        Ok(())
    }

    async fn len(&self) -> Result<usize, DomainError> {
        let state = self.state.read().map_err(|e| {
            DomainError::internal(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(state.owners.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn vector(id: &str, query_type: &str, embedding: Vec<f32>) -> IndexedVector {
        IndexedVector {
            id: id.to_string(),
            query_type: query_type.to_string(),
            embedding,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_search_ranks_by_distance() {
        let index = BruteForceIndex::new();
        index.insert(vector("far", "t", vec![0.0, 1.0])).await.unwrap();
        index.insert(vector("near", "t", vec![0.9, 0.1])).await.unwrap();
        index.insert(vector("same", "t", vec![1.0, 0.0])).await.unwrap();

        let matches = index
            .search(&IndexQuery::new("t", vec![1.0, 0.0], 2))
            .await
            .unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "same");
        assert!(matches[0].distance.abs() < 1e-6);
        assert_eq!(matches[1].id, "near");
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_query_type() {
        let index = BruteForceIndex::new();
        index.insert(vector("a", "creative_score", vec![1.0, 0.0])).await.unwrap();
        index.insert(vector("b", "ctr_prediction", vec![1.0, 0.0])).await.unwrap();

        let matches = index
            .search(&IndexQuery::new("ctr_prediction", vec![1.0, 0.0], 10))
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "b");

        let none = index
            .search(&IndexQuery::new("unknown", vec![1.0, 0.0], 10))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_search_skips_expired() {
        let index = BruteForceIndex::new();
        let now = Utc::now();

        let mut expired = vector("expired", "t", vec![1.0, 0.0]);
        expired.expires_at = Some(now - Duration::seconds(1));
        index.insert(expired).await.unwrap();
        index.insert(vector("live", "t", vec![0.8, 0.2])).await.unwrap();

        let mut query = IndexQuery::new("t", vec![1.0, 0.0], 10);
        query.now = now;
        let matches = index.search(&query).await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "live");
    }

    #[tokio::test]
    async fn test_search_keeps_ties_at_cut_off() {
        let index = BruteForceIndex::new();
        index.insert(vector("a", "t", vec![1.0, 0.0])).await.unwrap();
        index.insert(vector("b", "t", vec![1.0, 0.0])).await.unwrap();
        index.insert(vector("c", "t", vec![1.0, 0.0])).await.unwrap();
        index.insert(vector("far", "t", vec![0.0, 1.0])).await.unwrap();

        let matches = index
            .search(&IndexQuery::new("t", vec![1.0, 0.0], 1))
            .await
            .unwrap();

        let mut ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let none = index
            .search(&IndexQuery::new("t", vec![1.0, 0.0], 0))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_insert_replaces_and_remove() {
        let index = BruteForceIndex::new();
        index.insert(vector("a", "t", vec![0.0, 1.0])).await.unwrap();
        index.insert(vector("a", "t", vec![1.0, 0.0])).await.unwrap();

        assert_eq!(index.len().await.unwrap(), 1);

        let matches = index
            .search(&IndexQuery::new("t", vec![1.0, 0.0], 1))
            .await
            .unwrap();
        assert!(matches[0].distance.abs() < 1e-6);

        index.remove("a").await.unwrap();
        index.remove("missing").await.unwrap();
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[test]
    fn test_index_properties() {
        let index = BruteForceIndex::new();
        assert_eq!(index.name(), "brute_force");
        assert!(!index.is_persistent());
    }
}
