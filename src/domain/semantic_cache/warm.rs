//! Cache warming types

use serde::{Deserialize, Serialize};

/// Precomputed entry submitted to the warmer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmEntry {
    pub query_type: String,
    pub query_text: String,
    pub embedding: Vec<f32>,
    pub result: String,
    pub result_type: String,
    #[serde(default)]
    pub compute_time_ms: u64,
}

impl WarmEntry {
    pub fn new(
        query_type: impl Into<String>,
        query_text: impl Into<String>,
        embedding: Vec<f32>,
        result: impl Into<String>,
        result_type: impl Into<String>,
    ) -> Self {
        Self {
            query_type: query_type.into(),
            query_text: query_text.into(),
            embedding,
            result: result.into(),
            result_type: result_type.into(),
            compute_time_ms: 0,
        }
    }

    pub fn with_compute_time_ms(mut self, compute_time_ms: u64) -> Self {
        self.compute_time_ms = compute_time_ms;
        self
    }
}

/// Summary of a warming run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmReport {
    /// New warmed entries
    pub inserted: usize,
    /// Unused existing entries overwritten
    pub refreshed: usize,
    /// Entries skipped because an entry with hits already exists
    pub skipped: usize,
    /// Entries rejected by validation or failed to write
    pub failed: usize,
}

impl WarmReport {
    pub fn total(&self) -> usize {
        self.inserted + self.refreshed + self.skipped + self.failed
    }
}
