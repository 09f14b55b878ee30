//! Embedding provider implementations

mod factory;
mod http_client;
mod openai;

pub use factory::{EmbeddingProviderConfig, EmbeddingProviderFactory};
pub use http_client::{HttpClient, HttpClientTrait};
pub use openai::{model_dimensions, OpenAiEmbeddingProvider};

#[cfg(test)]
pub use http_client::mock::MockHttpClient;
