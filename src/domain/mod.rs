//! Domain layer - Cache entities, collaborator traits and errors

pub mod embedding;
pub mod error;
pub mod semantic_cache;

pub use embedding::{cosine_distance, cosine_similarity, EmbeddingProvider};
pub use error::DomainError;
pub use semantic_cache::{
    CacheEntry, CacheHit, CacheStore, IndexMatch, IndexQuery, IndexedVector, LookupOutcome,
    LookupRequest, QueryTypeStats, SemanticCacheConfig, SimilarMatch, SimilarityIndex,
    StoreRequest, UpsertOutcome, WarmEntry, WarmOutcome, WarmReport,
};
