//! Database migrations infrastructure

use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::DomainError;

/// PostgreSQL migrator tracking applied versions in `_migrations`
#[derive(Debug)]
pub struct PostgresMigrator {
    pool: PgPool,
}

impl PostgresMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the migrations table if it doesn't exist
    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                success BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to create migrations table: {}", e)))?;

        Ok(())
    }

    async fn is_applied(&self, version: i64) -> Result<bool, DomainError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)")
            .bind(version)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to check migration status: {}", e)))
    }

    /// Runs a single migration; returns false when it was already applied
    pub async fn run_migration(&self, migration: &Migration) -> Result<bool, DomainError> {
        self.ensure_migrations_table().await?;

        if self.is_applied(migration.version).await? {
            return Ok(false);
        }

        // Migrations hold several statements, which prepared queries reject
        sqlx::raw_sql(&migration.up)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to run migration {}: {}",
                    migration.version, e
                ))
            })?;

        sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to record migration {}: {}",
                    migration.version, e
                ))
            })?;

        info!(
            version = migration.version,
            description = %migration.description,
            "Applied migration"
        );

        Ok(true)
    }

    /// Reverts a single migration; returns false when it was not applied
    pub async fn revert_migration(&self, migration: &Migration) -> Result<bool, DomainError> {
        self.ensure_migrations_table().await?;

        if !self.is_applied(migration.version).await? {
            return Ok(false);
        }

        sqlx::raw_sql(&migration.down)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to revert migration {}: {}",
                    migration.version, e
                ))
            })?;

        sqlx::query("DELETE FROM _migrations WHERE version = $1")
            .bind(migration.version)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to remove migration record {}: {}",
                    migration.version, e
                ))
            })?;

        info!(version = migration.version, "Reverted migration");

        Ok(true)
    }

    /// Returns the latest applied migration version
    pub async fn current_version(&self) -> Result<Option<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM _migrations WHERE success = TRUE")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::storage(format!("Failed to get migration version: {}", e))
                })?;

        Ok(version)
    }
}

/// Represents a database migration
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    /// SQL to run when applying the migration
    pub up: String,
    /// SQL to run when reverting the migration
    pub down: String,
}

impl Migration {
    pub fn new(
        version: i64,
        description: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        Self {
            version,
            description: description.into(),
            up: up.into(),
            down: down.into(),
        }
    }
}

/// Migrations for the cache table
///
/// The vector column is typed with the deployment's embedding dimensionality,
/// so changing dimensions requires reverting and re-running.
pub fn cache_migrations(dimensions: usize) -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Enable pgvector",
            "CREATE EXTENSION IF NOT EXISTS vector;",
            "SELECT 1;",
        ),
        Migration::new(
            2,
            "Create semantic_cache_entries table",
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS semantic_cache_entries (
                    id TEXT PRIMARY KEY,
                    query_type TEXT NOT NULL,
                    query_text TEXT NOT NULL,
                    query_hash TEXT NOT NULL,
                    embedding vector({dimensions}) NOT NULL,
                    result TEXT NOT NULL,
                    result_type TEXT NOT NULL,
                    ttl_seconds BIGINT,
                    expires_at TIMESTAMPTZ,
                    access_count BIGINT NOT NULL DEFAULT 0,
                    last_accessed_at TIMESTAMPTZ,
                    compute_time_ms BIGINT NOT NULL DEFAULT 0,
                    avg_similarity_on_hit REAL NOT NULL DEFAULT 0,
                    is_warmed BOOLEAN NOT NULL DEFAULT FALSE,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    CONSTRAINT uq_semantic_cache_type_hash UNIQUE (query_type, query_hash)
                );
                CREATE INDEX IF NOT EXISTS idx_semantic_cache_expires_at
                    ON semantic_cache_entries(expires_at)
                    WHERE expires_at IS NOT NULL;
                CREATE INDEX IF NOT EXISTS idx_semantic_cache_eviction
                    ON semantic_cache_entries(query_type, is_warmed, (COALESCE(last_accessed_at, created_at)));
                "#
            ),
            "DROP TABLE IF EXISTS semantic_cache_entries;",
        ),
        Migration::new(
            3,
            "Create semantic_cache_entries vector index",
            r#"
            CREATE INDEX IF NOT EXISTS idx_semantic_cache_embedding
                ON semantic_cache_entries
                USING hnsw (embedding vector_cosine_ops);
            "#,
            "DROP INDEX IF EXISTS idx_semantic_cache_embedding;",
        ),
    ]
}

/// Runs all pending cache migrations, returning how many were applied
pub async fn run_cache_migrations(pool: &PgPool, dimensions: usize) -> Result<usize, DomainError> {
    let migrator = PostgresMigrator::new(pool.clone());
    let mut applied = 0;

    for migration in cache_migrations(dimensions) {
        if migrator.run_migration(&migration).await? {
            applied += 1;
        }
    }

    Ok(applied)
}

/// Reverts every applied cache migration, newest first
pub async fn revert_cache_migrations(
    pool: &PgPool,
    dimensions: usize,
) -> Result<usize, DomainError> {
    let migrator = PostgresMigrator::new(pool.clone());
    let mut reverted = 0;

    for migration in cache_migrations(dimensions).iter().rev() {
        if migrator.revert_migration(migration).await? {
            reverted += 1;
        }
    }

    Ok(reverted)
}
