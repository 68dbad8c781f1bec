use finreg_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::{GenerationOptions, Llm};

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatLlm {
    base_url: String,
    api_key: Option<String>,
    options: GenerationOptions,
}

impl OpenAiChatLlm {
    pub fn new(base_url: &str, api_key: Option<String>, options: GenerationOptions) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            options,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl Llm for OpenAiChatLlm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            AppError::new(codes::GENERATION_FAILED, "Generation API key is not configured")
        })?;

        let url = format!("{}/v1/chat/completions", self.base_url);
        let req = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let resp = ureq::post(&url)
            .timeout(self.options.timeout)
            .set("Authorization", &format!("Bearer {key}"))
            .send_json(serde_json::to_value(req).map_err(|e| {
                AppError::new(codes::GENERATION_FAILED, "Failed to encode chat request")
                    .with_details(e.to_string())
            })?);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: ChatResponse = r.into_json().map_err(|e| {
                    AppError::new(codes::GENERATION_FAILED, "Failed to decode chat response")
                        .with_details(e.to_string())
                })?;
                let content = v
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        AppError::new(codes::GENERATION_FAILED, "Chat response was empty")
                    })?;
                Ok(content)
            }
            Ok(r) => Err(
                AppError::new(codes::GENERATION_FAILED, "Chat request failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(status, _)) => Err(
                AppError::new(codes::GENERATION_FAILED, "Chat request failed")
                    .with_details(format!("status={status}"))
                    .with_retryable(status == 429 || status >= 500),
            ),
            Err(e) => Err(
                AppError::new(codes::GENERATION_FAILED, "Failed to call chat endpoint")
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_api_key_fails_without_network() {
        let llm = OpenAiChatLlm::new(
            "http://127.0.0.1:9",
            None,
            GenerationOptions {
                temperature: 0.1,
                max_tokens: 10,
                timeout: Duration::from_millis(50),
            },
        );
        let err = llm.generate("gpt-3.5-turbo", "hi").unwrap_err();
        assert_eq!(err.code, codes::GENERATION_FAILED);
        assert!(!err.retryable);
    }

    #[test]
    fn request_shape_matches_chat_completions() {
        let req = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "p",
            }],
            temperature: 0.5,
            max_tokens: 7,
        };
        let v = serde_json::to_value(req).unwrap();
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["max_tokens"], 7);
    }
}
