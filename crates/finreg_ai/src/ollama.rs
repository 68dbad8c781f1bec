use std::time::Duration;

use finreg_core::error::{codes, AppError};
use serde::de::DeserializeOwned;
use serde::Serialize;

const LOCAL_PREFIX: &str = "http://127.0.0.1";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
}

impl OllamaClient {
    /// Create a client for Ollama. This is strictly limited to `127.0.0.1`.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let rest = base_url.strip_prefix(LOCAL_PREFIX);
        let ok = match rest {
            Some("") => true,
            Some(r) => r
                .strip_prefix(':')
                .filter(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
                .and_then(|p| p.parse::<u16>().ok())
                .is_some_and(|port| port != 0),
            None => false,
        };
        if !ok {
            return Err(AppError::new(
                codes::REMOTE_NOT_ALLOWED,
                "Ollama base URL must be localhost (127.0.0.1)",
            )
            .with_details(format!("base_url={base_url}")));
        }

        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` as JSON to `path` and decode the reply; every failure carries `code`.
    /// Transport errors and 5xx replies are retryable.
    pub(crate) fn post_json<Req, Resp>(
        &self,
        path: &str,
        body: &Req,
        timeout: Duration,
        code: &str,
    ) -> Result<Resp, AppError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let payload = serde_json::to_value(body).map_err(|e| {
            AppError::new(code, "Failed to encode Ollama request").with_details(e.to_string())
        })?;

        match ureq::post(&url).timeout(timeout).send_json(payload) {
            Ok(r) => r.into_json::<Resp>().map_err(|e| {
                AppError::new(code, "Failed to decode Ollama response")
                    .with_details(format!("url={url}; err={e}"))
            }),
            Err(ureq::Error::Status(status, _)) => Err(AppError::new(code, "Ollama request failed")
                .with_details(format!("url={url}; status={status}"))
                .with_retryable(status >= 500)),
            Err(e) => Err(AppError::new(code, "Failed to reach Ollama on 127.0.0.1")
                .with_details(format!("url={url}; err={e}"))
                .with_retryable(true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_localhost_only_base_url() {
        assert!(OllamaClient::new("http://127.0.0.1:11434").is_ok());
        assert!(OllamaClient::new("http://127.0.0.1").is_ok());
        assert!(OllamaClient::new("http://127.0.0.1:11434/").is_ok());

        assert!(OllamaClient::new("http://localhost:11434").is_err());
        assert!(OllamaClient::new("http://0.0.0.0:11434").is_err());
        assert!(OllamaClient::new("https://api.openai.com").is_err());
        assert!(OllamaClient::new("http://127.0.0.1.evil.com:11434").is_err());
        assert!(OllamaClient::new("http://127.0.0.1@evil.com:11434").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:0").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:99999").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:11434/api").is_err());
    }
}
