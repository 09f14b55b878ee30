//! v1 cache API endpoints

pub mod cache;

use axum::{routing::post, Router};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/cache/lookup", post(cache::lookup))
        .route("/cache/store", post(cache::store))
        .route("/cache/similar", post(cache::similar))
}
