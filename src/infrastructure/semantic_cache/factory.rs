use std::sync::Arc;

use sqlx::PgPool;

use super::{BruteForceIndex, InMemoryCacheStore, PgvectorIndex, PostgresCacheStore};
use crate::domain::{CacheStore, DomainError, SimilarityIndex};
use crate::infrastructure::storage::{IndexType, StorageType};

/// Store and index pair backing a cache service
pub struct CacheBackends {
    pub store: Arc<dyn CacheStore>,
    pub index: Arc<dyn SimilarityIndex>,
}

impl std::fmt::Debug for CacheBackends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBackends")
            .field("index", &self.index.name())
            .finish_non_exhaustive()
    }
}

/// Factory for creating cache stores and similarity indexes
#[derive(Debug)]
pub struct CacheBackendFactory;

impl CacheBackendFactory {
    /// Create the store/index pair for the selected backends
    ///
    /// The pgvector index reads the cache table directly, so it requires the
    /// PostgreSQL store; a brute-force index works with either store.
    pub fn create(
        storage: StorageType,
        index: IndexType,
        pool: Option<PgPool>,
    ) -> Result<CacheBackends, DomainError> {
        let store: Arc<dyn CacheStore> = match storage {
            StorageType::InMemory => Arc::new(InMemoryCacheStore::new()),
            StorageType::Postgres => {
                let pool = pool.clone().ok_or_else(|| {
                    DomainError::configuration("PostgreSQL storage requires a connection pool")
                })?;
                Arc::new(PostgresCacheStore::new(pool))
            }
        };

        let index: Arc<dyn SimilarityIndex> = match (index, storage, pool) {
            (IndexType::BruteForce, _, _) => Arc::new(BruteForceIndex::new()),
            (IndexType::Pgvector, StorageType::Postgres, Some(pool)) => {
                Arc::new(PgvectorIndex::new(pool))
            }
            (IndexType::Pgvector, _, _) => {
                return Err(DomainError::configuration(
                    "The pgvector index requires PostgreSQL storage",
                ));
            }
        };

        Ok(CacheBackends { store, index })
    }

    /// In-memory store with a brute-force index
    pub fn in_memory() -> CacheBackends {
        CacheBackends {
            store: Arc::new(InMemoryCacheStore::new()),
            index: Arc::new(BruteForceIndex::new()),
        }
    }
}
