//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use crate::domain::DomainError;

/// Turns query text into a fixed-dimension vector (OpenAI, local models, etc.)
///
/// The cache never depends on a provider for correctness: any error returned
/// here makes a text lookup skip the cache.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Generate the embedding for a single input
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Dimensionality of the vectors this provider returns
    fn dimensions(&self) -> usize;
}
