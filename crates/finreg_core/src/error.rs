use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes shared by both crates.
pub mod codes {
    /// Input document is empty or the chunker is misconfigured.
    pub const CHUNKING_FAILED: &str = "CHUNKING_FAILED";
    /// A lookup ran before the first successful index refresh.
    pub const INDEX_UNAVAILABLE: &str = "INDEX_UNAVAILABLE";
    pub const INDEX_BUILD_FAILED: &str = "INDEX_BUILD_FAILED";
    pub const EMBEDDING_FAILED: &str = "EMBEDDING_FAILED";
    /// The external generation service failed, timed out or returned nothing.
    pub const GENERATION_FAILED: &str = "GENERATION_FAILED";
    pub const REMOTE_NOT_ALLOWED: &str = "REMOTE_NOT_ALLOWED";
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
    pub const CONFIG_READ_FAILED: &str = "CONFIG_READ_FAILED";
    pub const INGEST_FAILED: &str = "INGEST_FAILED";
    pub const DOCUMENT_INVALID: &str = "DOCUMENT_INVALID";
    pub const QUERY_LOG_FAILED: &str = "QUERY_LOG_FAILED";
    pub const QUERY_CACHE_FAILED: &str = "QUERY_CACHE_FAILED";
}

/// Single structured error shape used across the pipeline layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.details.as_deref() {
            Some(d) => write!(f, "[{}] {} ({})", self.code, self.message, d),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for AppError {}
