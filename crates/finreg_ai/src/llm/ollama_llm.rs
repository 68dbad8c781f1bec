use finreg_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::{GenerationOptions, Llm};
use crate::ollama::OllamaClient;

/// Local generation through Ollama's `/api/generate`, non-streaming.
#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    options: GenerationOptions,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient, options: GenerationOptions) -> Self {
        Self { client, options }
    }
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl Llm for OllamaLlm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        let req = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: SamplingOptions {
                temperature: self.options.temperature,
                num_predict: self.options.max_tokens,
            },
        };
        let resp: GenerateResponse =
            self.client
                .post_json("/api/generate", &req, self.options.timeout, codes::GENERATION_FAILED)?;

        let answer = resp.response.trim();
        if answer.is_empty() {
            return Err(AppError::new(codes::GENERATION_FAILED, "Ollama returned an empty answer")
                .with_details(format!("model={model}")));
        }
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_sampling_options() {
        let req = GenerateRequest {
            model: "llama3",
            prompt: "q",
            stream: false,
            options: SamplingOptions {
                temperature: 0.1,
                num_predict: 1000,
            },
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["stream"], false);
        assert_eq!(v["options"]["num_predict"], 1000);
    }

    #[test]
    fn unreachable_server_is_a_retryable_generation_failure() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let llm = OllamaLlm::new(
            OllamaClient::new("http://127.0.0.1:9").unwrap(),
            GenerationOptions {
                temperature: 0.1,
                max_tokens: 10,
                timeout: std::time::Duration::from_millis(300),
            },
        );
        let err = llm.generate("llama3", "hello").unwrap_err();
        assert_eq!(err.code, codes::GENERATION_FAILED);
        assert!(err.retryable);
    }
}
