//! Semantic Result Cache
//!
//! Reuses the results of expensive computations (LLM scoring, predictions,
//! generated analyses) for requests that mean the same thing as an earlier one:
//! - Exact-match fast path keyed by a hash of the normalized query text
//! - Cosine-similarity search scoped per query type, with per-type thresholds
//! - TTL expiry and per-type LRU capacity eviction in the background
//! - Cache warming, usage statistics and Prometheus metrics
//!
//! Lookups fail open: any internal failure is reported as a miss so callers
//! always fall back to computing the result themselves.

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, warn};

use api::state::AppState;
use infrastructure::{
    embedding::EmbeddingProviderFactory,
    semantic_cache::CacheBackendFactory,
    services::SemanticCacheService,
    storage::{connect_pool, run_cache_migrations, IndexType, StorageType},
};

/// Create the application state with default configuration
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default()).await
}

/// Create the application state with custom configuration
///
/// The cache service is built but not started; call
/// [`SemanticCacheService::start`] to rebuild the index and run maintenance.
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let cache = create_cache_service(config).await?;

    Ok(AppState::new(cache))
}

/// Build the cache service from configuration
pub async fn create_cache_service(config: &AppConfig) -> anyhow::Result<Arc<SemanticCacheService>> {
    config.cache.validate()?;

    let storage = StorageType::from_str(&config.storage.backend).unwrap_or_else(|| {
        warn!(backend = %config.storage.backend, "Unknown storage backend, using in-memory");
        StorageType::InMemory
    });
    let index = IndexType::from_str(&config.storage.index).unwrap_or_else(|| {
        warn!(index = %config.storage.index, "Unknown similarity index, using brute force");
        IndexType::BruteForce
    });

    info!("Storage backend: {:?}, similarity index: {:?}", storage, index);

    let pool = match storage {
        StorageType::Postgres => {
            let pool = connect_postgres(config).await?;

            if config.storage.run_migrations {
                let applied = run_cache_migrations(&pool, config.cache.embedding_dimensions).await?;
                info!(applied, "Cache schema migrations applied");
            }

            Some(pool)
        }
        StorageType::InMemory => None,
    };

    let backends = CacheBackendFactory::create(storage, index, pool)?;
    let provider =
        EmbeddingProviderFactory::create(&config.embedding, config.cache.embedding_dimensions)?;

    let mut service = SemanticCacheService::new(backends.store, backends.index, config.cache.clone());

    match provider {
        Some(provider) => {
            info!(provider = provider.provider_name(), "Embedding provider configured");
            service = service.with_embedding_provider(provider);
        }
        None => info!("No embedding provider configured; requests must carry embeddings"),
    }

    Ok(Arc::new(service))
}

/// Open the PostgreSQL pool described by the storage configuration
pub async fn connect_postgres(config: &AppConfig) -> anyhow::Result<PgPool> {
    let postgres = config
        .storage
        .postgres()
        .context("PostgreSQL storage requires storage.database_url or DATABASE_URL")?;

    info!("Connecting to PostgreSQL...");
    let pool = connect_pool(&postgres).await?;
    info!("PostgreSQL connection established");

    Ok(pool)
}
