//! Cache endpoint handlers

use axum::{extract::State, http::StatusCode};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{
    ApiError, Json, LookupApiRequest, LookupApiResponse, SimilarApiRequest, SimilarApiResponse,
    StoreApiRequest, StoreApiResponse,
};

/// POST /v1/cache/lookup
pub async fn lookup(
    State(state): State<AppState>,
    Json(body): Json<LookupApiRequest>,
) -> Result<Json<LookupApiResponse>, ApiError> {
    debug!(query_type = %body.query_type, "Cache lookup");

    let outcome = state.cache.lookup(body.into()).await?;

    Ok(Json(outcome.into()))
}

/// POST /v1/cache/store
///
/// Returns 201 with the entry id, or 202 without one when `detached` is set.
pub async fn store(
    State(state): State<AppState>,
    Json(body): Json<StoreApiRequest>,
) -> Result<(StatusCode, Json<StoreApiResponse>), ApiError> {
    debug!(
        query_type = %body.entry.query_type,
        detached = body.detached,
        "Cache store"
    );

    if body.detached {
        state.cache.store_detached(body.entry);
        return Ok((StatusCode::ACCEPTED, Json(StoreApiResponse { cache_id: None })));
    }

    let cache_id = state.cache.store(body.entry).await?;

    Ok((
        StatusCode::CREATED,
        Json(StoreApiResponse {
            cache_id: Some(cache_id),
        }),
    ))
}

/// POST /v1/cache/similar
pub async fn similar(
    State(state): State<AppState>,
    Json(body): Json<SimilarApiRequest>,
) -> Result<Json<SimilarApiResponse>, ApiError> {
    debug!(query_type = %body.query_type, "Similar entries query");

    let embedding = match (body.embedding, body.query_text) {
        (Some(embedding), _) => embedding,
        (None, Some(text)) => state.cache.embed_text(&text).await?,
        (None, None) => {
            return Err(ApiError::bad_request("Either embedding or query_text is required")
                .with_param("embedding"));
        }
    };

    let matches = state
        .cache
        .find_similar(&body.query_type, embedding, body.threshold, body.limit)
        .await?;

    Ok(Json(SimilarApiResponse { matches }))
}
