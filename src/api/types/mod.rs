//! API request/response types

pub mod cache;
pub mod error;
pub mod json;

pub use cache::{
    CleanupResponse, EvictResponse, LookupApiRequest, LookupApiResponse, SimilarApiRequest,
    SimilarApiResponse, StatsQuery, StoreApiRequest, StoreApiResponse, WarmApiRequest,
};
pub use error::{ApiError, ApiErrorResponse};
pub use json::Json;
