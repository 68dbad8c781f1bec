use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compliance::{default_pattern_records, default_response_pattern_records, PatternRecord, PatternTable};
use crate::error::{codes, AppError};

const DEFAULT_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../config/default.toml"
));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl PathsConfig {
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn query_cache_path(&self) -> PathBuf {
        self.data_dir.join("cache").join("query_cache.json")
    }

    pub fn query_log_path(&self) -> PathBuf {
        self.data_dir.join("cache").join("query_log.sqlite3")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Max characters per chunk.
    pub chunk_size: usize,
    /// Share of `chunk_size` repeated at the start of the next chunk; `[0, 1)`.
    pub overlap_fraction: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap_fraction: 0.125,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    L2,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: u32,
    /// How many candidates each sub-index contributes before merging.
    pub candidate_pool: u32,
    /// Weight of the lexical ranking; the dense ranking gets `1 - lexical_weight`.
    pub lexical_weight: f32,
    /// Raw cosine similarity floor for dense candidates.
    pub dense_min_similarity: f32,
    /// Largest raw L2 distance a dense candidate may have when `distance = "l2"`.
    pub dense_max_l2_distance: f32,
    /// Share of distinct query terms a chunk must contain to count as a lexical match.
    pub lexical_min_term_coverage: f32,
    /// Combined score a chunk must exceed to be returned.
    pub min_relevance: f32,
    pub distance: DistanceMetric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            candidate_pool: 10,
            lexical_weight: 0.5,
            dense_min_similarity: 0.2,
            dense_max_l2_distance: 1.25,
            lexical_min_term_coverage: 0.3,
            min_relevance: 0.05,
            distance: DistanceMetric::Cosine,
        }
    }
}

impl RetrievalConfig {
    /// Similarity floor for dense hits scored with `metric`. L2 hits are scored
    /// `1 / (1 + distance)`, so the distance cap maps onto that scale.
    pub fn dense_floor(&self, metric: DistanceMetric) -> f32 {
        match metric {
            DistanceMetric::Cosine => self.dense_min_similarity,
            DistanceMetric::L2 => 1.0 / (1.0 + self.dense_max_l2_distance),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Local deterministic feature hashing; no network.
    Hashing,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dims: usize,
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            model: "hashing-v1".to_string(),
            dims: 384,
            base_url: "http://127.0.0.1:11434".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationProvider {
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub base_url: String,
    /// Name of the environment variable holding the API key (OpenAI-compatible only).
    pub api_key_env: String,
    /// Budget for the excerpts placed in the prompt.
    pub max_context_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::OpenAi,
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            timeout_secs: 30,
            base_url: "https://api.openai.com".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_context_chars: 6000,
        }
    }
}

impl GenerationConfig {
    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComplianceConfig {
    pub patterns: Vec<PatternRecord>,
    pub response_patterns: Vec<PatternRecord>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            patterns: default_pattern_records(),
            response_patterns: default_response_pattern_records(),
        }
    }
}

/// Main configuration, one section per pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub compliance: ComplianceConfig,
}

impl Config {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::new(codes::CONFIG_READ_FAILED, "Failed to read configuration file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&raw).map_err(|e| {
            let details = format!(
                "path={}; err={}",
                path.display(),
                e.details.as_deref().unwrap_or(e.message.as_str())
            );
            e.with_details(details)
        })?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse the template shipped with the crate.
    pub fn default_template() -> Result<Self, AppError> {
        Self::from_toml_str(DEFAULT_TEMPLATE)
    }

    pub fn template_text() -> &'static str {
        DEFAULT_TEMPLATE
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let config: Self = toml::from_str(raw).map_err(|e| {
            AppError::new(codes::CONFIG_INVALID, "Failed to parse configuration")
                .with_details(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(invalid("chunking.chunk_size must be greater than zero"));
        }
        if !(0.0..1.0).contains(&c.overlap_fraction) {
            return Err(invalid("chunking.overlap_fraction must be in [0, 1)")
                .with_details(format!("overlap_fraction={}", c.overlap_fraction)));
        }

        let r = &self.retrieval;
        if r.top_k == 0 || r.candidate_pool == 0 {
            return Err(invalid("retrieval.top_k and retrieval.candidate_pool must be at least 1"));
        }
        for (name, v) in [
            ("retrieval.lexical_weight", r.lexical_weight),
            ("retrieval.dense_min_similarity", r.dense_min_similarity),
            ("retrieval.min_relevance", r.min_relevance),
            ("retrieval.lexical_min_term_coverage", r.lexical_min_term_coverage),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(invalid(format!("{name} must be in [0, 1]")).with_details(format!("{name}={v}")));
            }
        }
        if !r.dense_max_l2_distance.is_finite() || r.dense_max_l2_distance < 0.0 {
            return Err(invalid("retrieval.dense_max_l2_distance must be a non-negative number")
                .with_details(format!("dense_max_l2_distance={}", r.dense_max_l2_distance)));
        }

        if self.embedding.model.trim().is_empty() || self.embedding.dims == 0 {
            return Err(invalid("embedding.model and embedding.dims are required"));
        }
        if self.generation.model.trim().is_empty() {
            return Err(invalid("generation.model is required"));
        }
        if self.generation.timeout_secs == 0 {
            return Err(invalid("generation.timeout_secs must be greater than zero"));
        }

        // Surface regex errors at startup instead of on the first query.
        PatternTable::compile(&self.compliance.patterns)?;
        PatternTable::compile(&self.compliance.response_patterns)?;
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::new(codes::CONFIG_INVALID, message)
}
