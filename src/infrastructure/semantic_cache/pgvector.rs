//! pgvector similarity index

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use super::postgres::{embedding_to_pgvector, TABLE};
use crate::domain::semantic_cache::{IndexMatch, IndexQuery, IndexedVector, SimilarityIndex};
use crate::domain::DomainError;

/// Index that queries the cache table with pgvector's cosine distance operator
///
/// Vectors live in the same rows the store writes, so inserts and removals
/// are visible as soon as the store commits and `insert`/`remove` do nothing.
#[derive(Debug, Clone)]
pub struct PgvectorIndex {
    pool: PgPool,
}

impl PgvectorIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn search_sql() -> String {
        format!(
            r#"
            SELECT id, (embedding <=> $1::vector)::float8 AS distance
            FROM {}
            WHERE query_type = $2
              AND (expires_at IS NULL OR expires_at > $3)
            ORDER BY embedding <=> $1::vector, access_count DESC, created_at DESC
            LIMIT $4
            "#,
            TABLE
        )
    }
}

#[async_trait]
impl SimilarityIndex for PgvectorIndex {
    fn name(&self) -> &'static str {
        "pgvector"
    }

    fn is_persistent(&self) -> bool {
        true
    }

    async fn insert(&self, _item: IndexedVector) -> Result<(), DomainError> {
        Ok(())
    }

    async fn search(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>, DomainError> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);

        let rows = sqlx::query(&Self::search_sql())
            .bind(embedding_to_pgvector(&query.embedding))
            .bind(&query.query_type)
            .bind(query.now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(
                    query_type = %query.query_type,
                    error = %e,
                    "Similarity search failed"
                );
                DomainError::index_unavailable(format!("Similarity search failed: {}", e))
            })?;

        rows.iter()
            .map(|row| -> Result<_, DomainError> {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| DomainError::index_unavailable(e.to_string()))?;
                let distance: f64 = row
                    .try_get("distance")
                    .map_err(|e| DomainError::index_unavailable(e.to_string()))?;
                Ok(IndexMatch::new(id, distance as f32))
            })
            .collect()
    }

    async fn remove(&self, _id: &str) -> Result<(), DomainError> {
        Ok(())
    }

    async fn len(&self) -> Result<usize, DomainError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", TABLE))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::index_unavailable(format!("Failed to count vectors: {}", e)))?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}
