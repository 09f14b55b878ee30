//! Cache administration endpoints

use axum::extract::{Query, State};
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{
    ApiError, CleanupResponse, EvictResponse, Json, StatsQuery, WarmApiRequest,
};
use crate::domain::semantic_cache::{CacheStatsReport, WarmReport};
use crate::infrastructure::services::MaintenanceReport;

/// GET /admin/cache/stats
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<CacheStatsReport>, ApiError> {
    let report = state.cache.stats(query.query_type).await?;

    Ok(Json(report))
}

/// POST /admin/cache/cleanup
pub async fn cleanup_expired(
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let removed = state.cache.cleanup_expired().await?;
    info!(removed, "Manual expiry sweep completed");

    Ok(Json(CleanupResponse { removed }))
}

/// POST /admin/cache/evict
pub async fn evict(State(state): State<AppState>) -> Result<Json<EvictResponse>, ApiError> {
    let evicted = state.cache.evict_over_capacity().await?;
    info!(evicted, "Manual eviction pass completed");

    Ok(Json(EvictResponse { evicted }))
}

/// POST /admin/cache/maintenance
pub async fn run_maintenance(
    State(state): State<AppState>,
) -> Result<Json<MaintenanceReport>, ApiError> {
    let report = state.cache.run_maintenance_pass().await?;

    Ok(Json(report))
}

/// POST /admin/cache/warm
pub async fn warm(
    State(state): State<AppState>,
    Json(body): Json<WarmApiRequest>,
) -> Result<Json<WarmReport>, ApiError> {
    if body.entries.is_empty() {
        return Err(ApiError::bad_request("At least one entry is required").with_param("entries"));
    }

    Ok(Json(state.cache.warm(body.entries).await))
}
