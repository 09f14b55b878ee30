//! Infrastructure services

mod key_locks;
mod maintenance;
mod semantic_cache_service;

pub use maintenance::MaintenanceReport;
pub use semantic_cache_service::SemanticCacheService;
