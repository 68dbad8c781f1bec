use std::sync::Arc;

use finreg_core::config::{GenerationConfig, GenerationProvider};
use finreg_core::error::AppError;

use crate::ollama::OllamaClient;

/// Generation collaborator. Failures and timeouts surface as `GENERATION_FAILED`.
pub trait Llm: Send + Sync {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError>;
}

pub mod ollama_llm;
pub mod openai_chat;

pub use ollama_llm::OllamaLlm;
pub use openai_chat::OpenAiChatLlm;

/// Sampling and transport settings shared by the HTTP generators.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: std::time::Duration,
}

impl From<&GenerationConfig> for GenerationOptions {
    fn from(c: &GenerationConfig) -> Self {
        Self {
            temperature: c.temperature,
            max_tokens: c.max_tokens,
            timeout: std::time::Duration::from_secs(c.timeout_secs),
        }
    }
}

/// Generator selected by `[generation].provider`.
pub fn from_config(config: &GenerationConfig) -> Result<Arc<dyn Llm>, AppError> {
    let options = GenerationOptions::from(config);
    Ok(match config.provider {
        GenerationProvider::Ollama => {
            Arc::new(OllamaLlm::new(OllamaClient::new(&config.base_url)?, options))
        }
        GenerationProvider::OpenAi => {
            Arc::new(OpenAiChatLlm::new(&config.base_url, config.api_key(), options))
        }
    })
}
