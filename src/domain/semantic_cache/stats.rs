//! Cache statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CacheEntry;

/// Aggregates for one query type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryTypeStats {
    pub query_type: String,
    pub entry_count: usize,
    pub warmed_count: usize,
    pub avg_access_count: f64,
    /// Average cost of the cached computations, a proxy for time saved per hit
    pub avg_compute_time_ms: f64,
    /// Fraction of entries that were never hit
    pub unused_fraction: f64,
    /// Entries expiring within the configured horizon
    pub expiring_soon: usize,
}

impl QueryTypeStats {
    /// Compute stats from entries already restricted to one query type
    ///
    /// Entries that have expired at `now` are excluded.
    pub fn from_entries<'a>(
        query_type: impl Into<String>,
        entries: impl IntoIterator<Item = &'a CacheEntry>,
        now: DateTime<Utc>,
        expiring_before: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self {
            query_type: query_type.into(),
            ..Default::default()
        };

        let mut total_access = 0u64;
        let mut total_compute = 0u64;
        let mut unused = 0usize;

        for entry in entries.into_iter().filter(|e| !e.is_expired_at(now)) {
            stats.entry_count += 1;
            total_access += entry.access_count();
            total_compute += entry.compute_time_ms();

            if entry.access_count() == 0 {
                unused += 1;
            }

            if entry.is_warmed() {
                stats.warmed_count += 1;
            }

            if entry.expires_at().is_some_and(|e| e <= expiring_before) {
                stats.expiring_soon += 1;
            }
        }

        if stats.entry_count > 0 {
            let count = stats.entry_count as f64;
            stats.avg_access_count = total_access as f64 / count;
            stats.avg_compute_time_ms = total_compute as f64 / count;
            stats.unused_fraction = unused as f64 / count;
        }

        stats
    }
}

/// Service-level counters since startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCounters {
    pub lookups: u64,
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
    /// Lookups that fell back to a miss because of an internal failure or timeout
    pub fail_open: u64,
    pub stores: u64,
    pub store_failures: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheCounters {
    pub fn hits(&self) -> u64 {
        self.exact_hits + self.semantic_hits
    }

    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;

        if total == 0 {
            return 0.0;
        }

        self.hits() as f64 / total as f64
    }
}

/// Result of the stats administrative operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub query_types: Vec<QueryTypeStats>,
    pub counters: CacheCounters,
    pub hit_rate: f64,
    pub expiry_horizon_secs: u64,
}
