//! Infrastructure layer - Stores, indexes, providers and services

pub mod embedding;
pub mod logging;
pub mod observability;
pub mod semantic_cache;
pub mod services;
pub mod storage;
