//! Storage backend selection

/// Supported storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// In-memory storage (for testing/development)
    InMemory,
    /// PostgreSQL storage
    Postgres,
}

impl StorageType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }
}

/// Supported similarity index implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// Linear scan over an in-process copy of the vectors
    BruteForce,
    /// pgvector queries against the cache table
    Pgvector,
}

impl IndexType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "brute_force" | "brute-force" | "bruteforce" | "linear" => Some(Self::BruteForce),
            "pgvector" | "postgres" => Some(Self::Pgvector),
            _ => None,
        }
    }
}
