//! Semantic cache domain models and traits
//!
//! Results of expensive computations are cached under an embedding of the
//! query that produced them, so a later request that means the same thing
//! can reuse the answer even when its text differs.

mod config;
mod entry;
mod index;
mod key;
mod lookup;
mod stats;
mod store;
mod warm;

pub use config::{QueryTypeConfig, SemanticCacheConfig};
pub use entry::CacheEntry;
pub use index::{IndexMatch, IndexQuery, IndexedVector, SimilarityIndex};
pub use key::{normalize_query, query_hash, validate_query_type};
pub use lookup::{CacheHit, LookupOutcome, LookupRequest, SimilarMatch, StoreRequest};
pub(crate) use lookup::validate_search_params;
pub use stats::{CacheCounters, CacheStatsReport, QueryTypeStats};
pub use store::{CacheStore, UpsertOutcome, WarmOutcome};
pub use warm::{WarmEntry, WarmReport};

#[cfg(test)]
pub use index::MockSimilarityIndex;
#[cfg(test)]
pub use store::MockCacheStore;
