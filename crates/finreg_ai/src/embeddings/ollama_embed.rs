use std::time::Duration;

use finreg_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::ollama::OllamaClient;

/// Upper bound on bytes sent per embeddings request.
const MAX_INPUT_BYTES: usize = 12_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let req = EmbeddingsRequest {
            model,
            prompt: truncate_at_char_boundary(input, MAX_INPUT_BYTES),
        };
        let resp: EmbeddingsResponse =
            self.client
                .post_json("/api/embeddings", &req, REQUEST_TIMEOUT, codes::EMBEDDING_FAILED)?;
        if resp.embedding.is_empty() {
            return Err(AppError::new(codes::EMBEDDING_FAILED, "Ollama returned an empty embedding")
                .with_details(format!("model={model}")));
        }
        Ok(resp.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_never_splits_a_char() {
        let s = "é".repeat(10);
        let t = truncate_at_char_boundary(&s, 5);
        assert_eq!(t, "éé");
    }
}
