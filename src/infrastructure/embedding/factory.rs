use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::http_client::HttpClient;
use super::openai::{OpenAiEmbeddingProvider, DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL};
use crate::domain::{DomainError, EmbeddingProvider};

/// Embedding provider configuration
///
/// Without a provider, callers must send embeddings with every request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingProviderConfig {
    #[default]
    None,
    OpenAi {
        api_key: String,
        #[serde(default = "default_base_url")]
        base_url: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_timeout_ms() -> u64 {
    2000
}

/// Factory for creating embedding providers
#[derive(Debug)]
pub struct EmbeddingProviderFactory;

impl EmbeddingProviderFactory {
    /// Create the configured provider, producing vectors of `dimensions`
    pub fn create(
        config: &EmbeddingProviderConfig,
        dimensions: usize,
    ) -> Result<Option<Arc<dyn EmbeddingProvider>>, DomainError> {
        match config {
            EmbeddingProviderConfig::None => Ok(None),

            EmbeddingProviderConfig::OpenAi {
                api_key,
                base_url,
                model,
                timeout_ms,
            } => {
                if api_key.trim().is_empty() {
                    return Err(DomainError::configuration(
                        "OpenAI embedding provider requires an api_key",
                    ));
                }

                let http_client = HttpClient::with_timeout(Duration::from_millis(*timeout_ms))?;
                let provider =
                    OpenAiEmbeddingProvider::with_base_url(http_client, api_key, base_url, dimensions)
                        .with_model(model);

                Ok(Some(Arc::new(provider)))
            }
        }
    }
}
