use std::sync::Arc;

use finreg_core::config::{EmbeddingConfig, EmbeddingProvider};
use finreg_core::error::AppError;

use crate::ollama::OllamaClient;

pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;
}

pub mod hashing;
pub mod ollama_embed;

pub use hashing::HashingEmbedder;
pub use ollama_embed::OllamaEmbedder;

/// Embedder selected by `[embedding].provider`.
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, AppError> {
    Ok(match config.provider {
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(config.dims)?),
        EmbeddingProvider::Ollama => {
            Arc::new(OllamaEmbedder::new(OllamaClient::new(&config.base_url)?))
        }
    })
}
