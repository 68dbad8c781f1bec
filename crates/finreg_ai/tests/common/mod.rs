#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use finreg_ai::embeddings::{Embedder, HashingEmbedder};
use finreg_ai::llm::Llm;
use finreg_ai::Assistant;
use finreg_core::config::Config;
use finreg_core::demo::sample_documents;
use finreg_core::error::{codes, AppError};
use tempfile::TempDir;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Scratch directory removed when the returned guard drops.
pub fn temp_root(name: &str) -> TempDir {
    tempfile::Builder::new()
        .prefix(&format!("finreg-ai-{name}-"))
        .tempdir()
        .expect("tempdir")
}

/// Returns a fixed answer and records every prompt it receives.
pub struct StubLlm {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl StubLlm {
    pub fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

impl Llm for StubLlm {
    fn generate(&self, _model: &str, prompt: &str) -> Result<String, AppError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

/// Fails every call the way an unreachable endpoint does.
pub struct DownLlm;

impl Llm for DownLlm {
    fn generate(&self, _model: &str, _prompt: &str) -> Result<String, AppError> {
        Err(AppError::new(codes::GENERATION_FAILED, "generation failed (timeout)")
            .with_details("stub endpoint down")
            .with_retryable(true))
    }
}

/// Hashing embedder that counts calls and can be switched to fail.
pub struct CountingEmbedder {
    inner: HashingEmbedder,
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
}

impl CountingEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HashingEmbedder::new(384).unwrap(),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Embedder for CountingEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::new(codes::EMBEDDING_FAILED, "embedding service unavailable")
                .with_retryable(true));
        }
        self.inner.embed(model, input)
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.embedding.dims = 384;
    config
}

/// Assistant over the bundled sample corpus, index refreshed.
pub fn sample_assistant(embedder: Arc<dyn Embedder>, llm: Arc<dyn Llm>) -> Assistant {
    sample_assistant_with(test_config(), embedder, llm)
}

pub fn sample_assistant_with(config: Config, embedder: Arc<dyn Embedder>, llm: Arc<dyn Llm>) -> Assistant {
    init_tracing();
    let assistant = Assistant::new(config, embedder, llm).expect("assistant");
    let added = assistant
        .add_documents(sample_documents().expect("sample docs"))
        .expect("add documents");
    assert!(added.rejected.is_empty(), "rejected: {:?}", added.rejected);
    assistant.refresh_index().expect("refresh");
    assistant
}
