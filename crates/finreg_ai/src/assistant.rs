use std::path::Path;
use std::sync::{Arc, RwLock};

use finreg_core::cache::QueryCache;
use finreg_core::compliance::{ComplianceAnnotator, PatternTable};
use finreg_core::config::Config;
use finreg_core::domain::{Document, QueryResult, Warning};
use finreg_core::error::{codes, AppError};
use finreg_core::ingest::{load_corpus_dir, SkippedFile};
use finreg_core::query_log::{QueryLog, QueryLogEntry, QueryStatistics};
use serde::{Deserialize, Serialize};

use crate::answer::{degraded_result, prompts, AnswerComposer};
use crate::chunking::Chunker;
use crate::embeddings::{self, Embedder};
use crate::guardrails::{merge_warnings, screen_answer};
use crate::index::{IndexPersistence, IndexStore, Indexer, RefreshSummary};
use crate::llm::{self, Llm};
use crate::retrieve::Retriever;
use crate::store::{AddDocumentsResult, DocumentStore, StoreSummary};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusIngestResult {
    pub added: AddDocumentsResult,
    pub skipped_files: Vec<SkippedFile>,
}

/// End-to-end query service: retrieve, annotate, compose, then cache and log.
pub struct Assistant {
    config: Config,
    chunker: Chunker,
    store: RwLock<DocumentStore>,
    indexer: Arc<Indexer>,
    retriever: Retriever,
    patterns: PatternTable,
    composer: AnswerComposer,
    cache: Option<QueryCache>,
    log: Option<QueryLog>,
    index_store: Option<IndexStore>,
}

impl Assistant {
    /// Pipeline with injected collaborators and no persistence.
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, llm: Arc<dyn Llm>) -> Result<Self, AppError> {
        config.validate()?;
        let chunker = Chunker::new(&config.chunking)?;
        let patterns = PatternTable::compile(&config.compliance.patterns)?;
        let response_patterns = PatternTable::compile(&config.compliance.response_patterns)?;

        let indexer = Arc::new(Indexer::new(
            embedder,
            config.embedding.model.clone(),
            config.retrieval.distance,
        ));
        let retriever = Retriever::new(indexer.clone(), config.retrieval.clone());
        let composer = AnswerComposer::new(
            llm,
            config.generation.model.clone(),
            config.generation.max_context_chars,
        )
        .with_response_screen(response_patterns);

        Ok(Self {
            config,
            chunker,
            store: RwLock::new(DocumentStore::new()),
            indexer,
            retriever,
            patterns,
            composer,
            cache: None,
            log: None,
            index_store: None,
        })
    }

    /// Pipeline wired from configuration: providers from `[embedding]`/`[generation]`,
    /// cache, query log and index files under `[paths].data_dir`.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let embedder = embeddings::from_config(&config.embedding)?;
        let llm = llm::from_config(&config.generation)?;
        let paths = config.paths.clone();
        Ok(Self::new(config, embedder, llm)?
            .with_query_cache(QueryCache::new(paths.query_cache_path()))
            .with_query_log(QueryLog::open(&paths.query_log_path())?)
            .with_index_store(IndexStore::open(paths.index_dir())))
    }

    pub fn with_query_cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_query_log(mut self, log: QueryLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_index_store(mut self, store: IndexStore) -> Self {
        self.index_store = Some(store);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.indexer
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn composer(&self) -> &AnswerComposer {
        &self.composer
    }

    fn store_read(&self) -> Result<std::sync::RwLockReadGuard<'_, DocumentStore>, AppError> {
        self.store
            .read()
            .map_err(|_| AppError::new(codes::INDEX_BUILD_FAILED, "Document store lock poisoned"))
    }

    pub fn add_documents(&self, docs: Vec<Document>) -> Result<AddDocumentsResult, AppError> {
        let mut store = self
            .store
            .write()
            .map_err(|_| AppError::new(codes::INDEX_BUILD_FAILED, "Document store lock poisoned"))?;
        Ok(store.put_documents(docs, &self.chunker))
    }

    /// Load every supported file under `root` into the document store.
    pub fn ingest_dir(&self, root: &Path) -> Result<CorpusIngestResult, AppError> {
        let load = load_corpus_dir(root)?;
        let added = self.add_documents(load.documents)?;
        Ok(CorpusIngestResult {
            added,
            skipped_files: load.skipped,
        })
    }

    pub fn store_summary(&self) -> Result<StoreSummary, AppError> {
        Ok(self.store_read()?.summary())
    }

    /// Rebuild the index from the document store and persist it when an index store is set.
    ///
    /// Cached answers survive only a refresh that leaves the active index unchanged.
    pub fn refresh_index(&self) -> Result<RefreshSummary, AppError> {
        let chunks = self.store_read()?.all_chunks();
        let before = self.active_digest();
        let summary = self.indexer.refresh(chunks)?;
        let snap = self.indexer.snapshot()?;
        if before.as_deref() != Some(snap.content_digest().as_str()) {
            self.clear_cache();
        }
        if let Some(index_store) = self.index_store.as_ref() {
            if let Err(e) = index_store.save(&snap) {
                tracing::warn!(error = %e, "failed to persist index; keeping in-memory index");
            }
        }
        Ok(summary)
    }

    fn active_digest(&self) -> Option<String> {
        self.indexer.snapshot().ok().map(|s| s.content_digest())
    }

    fn clear_cache(&self) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        match cache.clear() {
            Ok(removed) => tracing::info!(removed, "index changed; query cache cleared"),
            Err(e) => tracing::warn!(error = %e, "failed to clear query cache"),
        }
    }

    /// Install the persisted index, if one is committed on disk. Returns whether one was loaded.
    pub fn load_index(&self) -> Result<bool, AppError> {
        let Some(index_store) = self.index_store.as_ref() else {
            return Ok(false);
        };
        match index_store.load() {
            Ok(snapshot) if snapshot.model() != self.indexer.model() => {
                tracing::warn!(
                    persisted = snapshot.model(),
                    configured = self.indexer.model(),
                    "persisted index was built with another embedding model; ignoring it"
                );
                Ok(false)
            }
            Ok(snapshot) => {
                // The cache on disk belongs to the persisted index; it is stale only
                // when this replaces a different in-memory index.
                let replaced = self
                    .active_digest()
                    .is_some_and(|before| before != snapshot.content_digest());
                self.indexer.install(snapshot)?;
                if replaced {
                    self.clear_cache();
                }
                Ok(true)
            }
            Err(e) if e.is(codes::INDEX_UNAVAILABLE) => {
                tracing::info!(error = %e, "no persisted index to load");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn annotate(&self, query: &str, chunk_texts: &[&str]) -> Vec<Warning> {
        ComplianceAnnotator::new(&self.patterns).annotate(query, chunk_texts)
    }

    pub fn answer(&self, query: &str, top_k: Option<u32>) -> QueryResult {
        self.answer_with(query, top_k, true)
    }

    /// Answer `query`. Never fails: every error becomes a degraded result.
    ///
    /// The cache only serves and stores requests at the default `top_k`, and never
    /// stores degraded or no-context replies.
    #[tracing::instrument(skip(self))]
    pub fn answer_with(&self, query: &str, top_k: Option<u32>, use_cache: bool) -> QueryResult {
        let cacheable =
            use_cache && self.retriever.effective_top_k(top_k) == self.retriever.effective_top_k(None);
        if cacheable {
            if let Some(hit) = self.cached(query) {
                self.log_answer(query, &hit, true);
                return hit;
            }
        }

        let result = match self.retriever.retrieve(query, top_k) {
            Ok(chunks) => {
                let texts: Vec<&str> = chunks.iter().map(|rc| rc.chunk.text.as_str()).collect();
                let warnings = self.annotate(query, &texts);
                self.composer.compose(query, &chunks, warnings)
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed");
                degraded_result(prompts::INDEX_UNAVAILABLE_ANSWER, self.annotate(query, &[]), &e)
            }
        };

        if cacheable && !result.is_degraded() && !result.sources.is_empty() {
            if let Some(cache) = self.cache.as_ref() {
                if let Err(e) = cache.put(query, &result) {
                    tracing::warn!(error = %e, "failed to write query cache");
                }
            }
        }
        self.log_answer(query, &result, false);
        result
    }

    fn log_answer(&self, query: &str, result: &QueryResult, cached: bool) {
        let Some(log) = self.log.as_ref() else {
            return;
        };
        let entry = QueryLogEntry::from_result(query, result, self.composer.model()).with_cached(cached);
        if let Err(e) = log.append(&entry) {
            tracing::warn!(error = %e, "failed to append query log");
        }
    }

    /// Cached result with warnings and risk recomputed against the current pattern tables.
    fn cached(&self, query: &str) -> Option<QueryResult> {
        let cache = self.cache.as_ref()?;
        let mut hit = match cache.get(query) {
            Ok(Some(r)) if !r.is_degraded() => r,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "query cache unreadable; answering without it");
                return None;
            }
        };

        let snap = self.indexer.snapshot().ok();
        let texts: Vec<&str> = match snap.as_deref() {
            Some(s) => hit
                .sources
                .iter()
                .filter_map(|src| {
                    s.chunks()
                        .iter()
                        .find(|c| c.document_id == src.name && c.chunk_index + 1 == src.chunk)
                        .map(|c| c.text.as_str())
                })
                .collect(),
            None => Vec::new(),
        };
        let mut warnings = self.annotate(query, &texts);
        if let Some(table) = self.composer.response_screen() {
            merge_warnings(&mut warnings, screen_answer(&hit.answer, table));
        }
        hit.warnings = warnings;
        hit.assess_risk();
        tracing::info!("using cached response");
        Some(hit)
    }

    pub fn statistics(&self) -> Result<QueryStatistics, AppError> {
        match self.log.as_ref() {
            Some(log) => log.statistics(),
            None => Ok(QueryStatistics::default()),
        }
    }

    pub fn similar_queries(&self, query: &str, k: usize) -> Result<Vec<String>, AppError> {
        match self.log.as_ref() {
            Some(log) => log.similar_queries(query, k),
            None => Ok(Vec::new()),
        }
    }
}
