//! Cache store and similarity index implementations

mod brute_force;
mod factory;
mod in_memory;
mod pgvector;
mod postgres;

pub use brute_force::BruteForceIndex;
pub use factory::{CacheBackendFactory, CacheBackends};
pub use in_memory::InMemoryCacheStore;
pub use pgvector::PgvectorIndex;
pub use postgres::PostgresCacheStore;
