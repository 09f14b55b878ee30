//! PostgreSQL cache store implementation

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::semantic_cache::{
    CacheEntry, CacheStore, IndexedVector, QueryTypeStats, UpsertOutcome, WarmOutcome,
};
use crate::domain::DomainError;

pub(crate) const TABLE: &str = "semantic_cache_entries";

const COLUMNS: &str = "id, query_type, query_text, query_hash, embedding::text AS embedding, \
     result, result_type, ttl_seconds, expires_at, access_count, last_accessed_at, \
     compute_time_ms, avg_similarity_on_hit, is_warmed, created_at, updated_at";

const INSERT_PREFIX: &str = "INSERT INTO semantic_cache_entries (\
     id, query_type, query_text, query_hash, embedding, result, result_type, \
     ttl_seconds, expires_at, compute_time_ms, is_warmed, created_at, updated_at) \
     VALUES ($1, $2, $3, $4, $5::vector, $6, $7, $8, $9, $10, $11, $12, $13) \
     ON CONFLICT (query_type, query_hash) DO UPDATE SET \
     query_text = EXCLUDED.query_text, \
     embedding = EXCLUDED.embedding, \
     result = EXCLUDED.result, \
     result_type = EXCLUDED.result_type, \
     ttl_seconds = EXCLUDED.ttl_seconds, \
     expires_at = EXCLUDED.expires_at, \
     compute_time_ms = EXCLUDED.compute_time_ms, \
     is_warmed = EXCLUDED.is_warmed, \
     updated_at = EXCLUDED.updated_at";

/// Plain upsert: a conflicting row keeps its id, creation time and counters
fn upsert_sql() -> String {
    format!("{} RETURNING id, (xmax = 0) AS created", INSERT_PREFIX)
}

/// Warm upsert: a conflicting row is only overwritten while it has no hits
fn upsert_warm_sql() -> String {
    format!(
        "{} WHERE {}.access_count = 0 RETURNING id, (xmax = 0) AS created",
        INSERT_PREFIX, TABLE
    )
}

const RECORD_HIT_SQL: &str = "UPDATE semantic_cache_entries SET \
     access_count = access_count + 1, \
     last_accessed_at = GREATEST(COALESCE(last_accessed_at, $3), $3), \
     avg_similarity_on_hit = avg_similarity_on_hit \
         + ($2 - avg_similarity_on_hit) / (access_count + 1)::real \
     WHERE id = $1";

const DELETE_EXPIRED_SQL: &str = "DELETE FROM semantic_cache_entries WHERE id IN (\
     SELECT id FROM semantic_cache_entries \
     WHERE expires_at IS NOT NULL AND expires_at < $1 LIMIT $2) \
     RETURNING id";

const EVICTION_CANDIDATES_SQL: &str = "SELECT id FROM semantic_cache_entries \
     WHERE query_type = $1 \
       AND (expires_at IS NULL OR expires_at > $2) \
     ORDER BY is_warmed ASC, COALESCE(last_accessed_at, created_at) ASC, id ASC \
     LIMIT $3";

const COUNT_BY_TYPE_SQL: &str = "SELECT query_type, COUNT(*) FROM semantic_cache_entries \
     WHERE expires_at IS NULL OR expires_at > $1 \
     GROUP BY query_type";

const STATS_SQL: &str = "SELECT query_type, \
     COUNT(*) AS entry_count, \
     COUNT(*) FILTER (WHERE is_warmed) AS warmed_count, \
     COALESCE(AVG(access_count)::float8, 0) AS avg_access_count, \
     COALESCE(AVG(compute_time_ms)::float8, 0) AS avg_compute_time_ms, \
     COALESCE((COUNT(*) FILTER (WHERE access_count = 0))::float8 / NULLIF(COUNT(*), 0)::float8, 0) \
         AS unused_fraction, \
     COUNT(*) FILTER (WHERE expires_at IS NOT NULL AND expires_at <= $2) AS expiring_soon \
     FROM semantic_cache_entries \
     WHERE (expires_at IS NULL OR expires_at > $1) \
       AND ($3::text IS NULL OR query_type = $3) \
     GROUP BY query_type \
     ORDER BY query_type";

/// Encode an embedding in pgvector's text format
pub(crate) fn embedding_to_pgvector(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

/// Parse a pgvector string representation back to a Vec<f32>
pub(crate) fn parse_pgvector(s: &str) -> Result<Vec<f32>, DomainError> {
    let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']');

    if trimmed.trim().is_empty() {
        return Ok(Vec::new());
    }

    trimmed
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<Vec<f32>, _>>()
        .map_err(|e| DomainError::storage(format!("Failed to parse vector: {}", e)))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::storage(format!("{}: {}", context, e))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| DomainError::storage(format!("Failed to read column '{}': {}", name, e)))
}

fn row_to_entry(row: &PgRow) -> Result<CacheEntry, DomainError> {
    let embedding: String = column(row, "embedding")?;
    let ttl_seconds: Option<i64> = column(row, "ttl_seconds")?;

    Ok(CacheEntry {
        id: column(row, "id")?,
        query_type: column(row, "query_type")?,
        query_text: column(row, "query_text")?,
        query_hash: column(row, "query_hash")?,
        embedding: parse_pgvector(&embedding)?,
        result: column(row, "result")?,
        result_type: column(row, "result_type")?,
        ttl_seconds: ttl_seconds.map(to_u64),
        expires_at: column(row, "expires_at")?,
        access_count: to_u64(column(row, "access_count")?),
        last_accessed_at: column(row, "last_accessed_at")?,
        compute_time_ms: to_u64(column(row, "compute_time_ms")?),
        avg_similarity_on_hit: column(row, "avg_similarity_on_hit")?,
        is_warmed: column(row, "is_warmed")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

/// Cache store backed by the `semantic_cache_entries` table
///
/// Uniqueness of `(query_type, query_hash)` is enforced by the table, and
/// every keyed write is a single `INSERT .. ON CONFLICT` statement.
#[derive(Debug, Clone)]
pub struct PostgresCacheStore {
    pool: PgPool,
}

impl PostgresCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn execute_upsert(
        &self,
        sql: &str,
        entry: &CacheEntry,
    ) -> Result<Option<(String, bool)>, DomainError> {
        let row = sqlx::query(sql)
            .bind(entry.id())
            .bind(entry.query_type())
            .bind(entry.query_text())
            .bind(entry.query_hash())
            .bind(embedding_to_pgvector(entry.embedding()))
            .bind(entry.result())
            .bind(entry.result_type())
            .bind(entry.ttl_seconds().map(to_i64))
            .bind(entry.expires_at())
            .bind(to_i64(entry.compute_time_ms()))
            .bind(entry.is_warmed())
            .bind(entry.created_at())
            .bind(entry.updated_at())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to upsert cache entry", e))?;

        row.map(|row| -> Result<_, DomainError> {
            Ok((column(&row, "id")?, column(&row, "created")?))
        })
        .transpose()
    }
}

#[async_trait]
impl CacheStore for PostgresCacheStore {
    async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, DomainError> {
        let (id, created) = self
            .execute_upsert(&upsert_sql(), &entry)
            .await?
            .ok_or_else(|| DomainError::storage("Upsert returned no row"))?;

        Ok(UpsertOutcome { id, created })
    }

    async fn upsert_warm(&self, entry: CacheEntry) -> Result<WarmOutcome, DomainError> {
        match self.execute_upsert(&upsert_warm_sql(), &entry).await? {
            Some((id, true)) => Ok(WarmOutcome::Inserted(id)),
            Some((id, false)) => Ok(WarmOutcome::Refreshed(id)),
            None => {
                // The conflict guard rejected the update, so the row exists and has hits
                let id = self
                    .find_by_hash(entry.query_type(), entry.query_hash())
                    .await?
                    .map(|e| e.id().to_string())
                    .unwrap_or_else(|| entry.id().to_string());
                Ok(WarmOutcome::Skipped(id))
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<CacheEntry>, DomainError> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", COLUMNS, TABLE);

        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get cache entry", e))?
            .as_ref()
            .map(row_to_entry)
            .transpose()
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<CacheEntry>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {} FROM {} WHERE id = ANY($1)", COLUMNS, TABLE);

        sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get cache entries", e))?
            .iter()
            .map(row_to_entry)
            .collect()
    }

    async fn find_by_hash(
        &self,
        query_type: &str,
        query_hash: &str,
    ) -> Result<Option<CacheEntry>, DomainError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE query_type = $1 AND query_hash = $2",
            COLUMNS, TABLE
        );

        sqlx::query(&sql)
            .bind(query_type)
            .bind(query_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find cache entry by hash", e))?
            .as_ref()
            .map(row_to_entry)
            .transpose()
    }

    async fn record_hit(
        &self,
        id: &str,
        similarity: f32,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(RECORD_HIT_SQL)
            .bind(id)
            .bind(similarity)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to record cache hit", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, DomainError> {
        sqlx::query_scalar(DELETE_EXPIRED_SQL)
            .bind(now)
            .bind(to_i64(limit as u64))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete expired entries", e))
    }

    async fn count_by_type(
        &self,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, usize>, DomainError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(COUNT_BY_TYPE_SQL)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count cache entries", e))?;

        Ok(rows
            .into_iter()
            .map(|(query_type, count)| (query_type, to_u64(count) as usize))
            .collect())
    }

    async fn eviction_candidates(
        &self,
        query_type: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, DomainError> {
        sqlx::query_scalar(EVICTION_CANDIDATES_SQL)
            .bind(query_type)
            .bind(now)
            .bind(to_i64(limit as u64))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to select eviction candidates", e))
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, DomainError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM semantic_cache_entries WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete cache entries", e))?;

        Ok(result.rows_affected() as usize)
    }

    async fn stats(
        &self,
        query_type: Option<String>,
        now: DateTime<Utc>,
        expiring_before: DateTime<Utc>,
    ) -> Result<Vec<QueryTypeStats>, DomainError> {
        let rows = sqlx::query(STATS_SQL)
            .bind(now)
            .bind(expiring_before)
            .bind(query_type)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to compute cache stats", e))?;

        rows.iter()
            .map(|row| -> Result<_, DomainError> {
                Ok(QueryTypeStats {
                    query_type: column(row, "query_type")?,
                    entry_count: to_u64(column(row, "entry_count")?) as usize,
                    warmed_count: to_u64(column(row, "warmed_count")?) as usize,
                    avg_access_count: column(row, "avg_access_count")?,
                    avg_compute_time_ms: column(row, "avg_compute_time_ms")?,
                    unused_fraction: column(row, "unused_fraction")?,
                    expiring_soon: to_u64(column(row, "expiring_soon")?) as usize,
                })
            })
            .collect()
    }

    async fn indexed_vectors(&self, now: DateTime<Utc>) -> Result<Vec<IndexedVector>, DomainError> {
        let rows = sqlx::query(
            "SELECT id, query_type, embedding::text AS embedding, expires_at \
             FROM semantic_cache_entries \
             WHERE expires_at IS NULL OR expires_at > $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load cache vectors", e))?;

        rows.iter()
            .map(|row| -> Result<_, DomainError> {
                let embedding: String = column(row, "embedding")?;
                Ok(IndexedVector {
                    id: column(row, "id")?,
                    query_type: column(row, "query_type")?,
                    embedding: parse_pgvector(&embedding)?,
                    expires_at: column(row, "expires_at")?,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), DomainError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| db_error("Database health check failed", e))
    }
}
