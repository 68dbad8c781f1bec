use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, RwLock};

use finreg_core::config::DistanceMetric;
use finreg_core::domain::now_rfc3339;
use finreg_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chunking::Chunk;
use crate::embeddings::Embedder;

pub mod dense;
pub mod lexical;
pub mod store;

pub use dense::DenseIndex;
pub use lexical::LexicalIndex;
pub use store::{IndexPersistence, IndexStatus, IndexStore};

/// Result order used everywhere: score desc, then chunk index asc, document id, chunk id.
pub fn ranking_cmp(a_score: f32, a: &Chunk, b_score: f32, b: &Chunk) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then(a.chunk_index.cmp(&b.chunk_index))
        .then_with(|| a.document_id.cmp(&b.document_id))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

#[derive(Debug, Clone, Copy)]
pub struct IndexHit<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

/// Immutable pair of synchronized indexes over one chunk set.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    chunks: Vec<Chunk>,
    lexical: LexicalIndex,
    dense: DenseIndex,
    built_at: String,
}

impl IndexSnapshot {
    /// Assemble a snapshot; entry `i` of both indexes must describe `chunks[i]`.
    pub fn from_parts(
        chunks: Vec<Chunk>,
        lexical: LexicalIndex,
        dense: DenseIndex,
        built_at: String,
    ) -> Result<Self, AppError> {
        if lexical.len() != chunks.len() || dense.len() != chunks.len() {
            return Err(AppError::new(
                codes::INDEX_BUILD_FAILED,
                "Index entry counts do not match chunk count",
            )
            .with_details(format!(
                "chunks={}; lexical={}; dense={}",
                chunks.len(),
                lexical.len(),
                dense.len()
            )));
        }
        Ok(Self {
            chunks,
            lexical,
            dense,
            built_at,
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn dense(&self) -> &DenseIndex {
        &self.dense
    }

    pub fn model(&self) -> &str {
        self.dense.model()
    }

    pub fn built_at(&self) -> &str {
        &self.built_at
    }

    /// SHA-256 over the model, the metric and every chunk id and text hash, in
    /// index order. Snapshots with equal digests rank every query the same way.
    pub fn content_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model().as_bytes());
        hasher.update(match self.dense.metric() {
            DistanceMetric::Cosine => b"cosine".as_slice(),
            DistanceMetric::L2 => b"l2".as_slice(),
        });
        for c in &self.chunks {
            hasher.update([0u8]);
            hasher.update(c.chunk_id.as_bytes());
            hasher.update([0u8]);
            hasher.update(c.text_sha256.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    fn top_k(&self, scored: Vec<(usize, f32)>, k: usize) -> Vec<IndexHit<'_>> {
        let mut hits: Vec<IndexHit<'_>> = scored
            .into_iter()
            .filter_map(|(i, score)| self.chunks.get(i).map(|chunk| IndexHit { chunk, score }))
            .collect();
        hits.sort_by(|a, b| ranking_cmp(a.score, a.chunk, b.score, b.chunk));
        hits.truncate(k);
        hits
    }

    /// Top-k chunks by BM25 score; only positive scores are returned.
    pub fn lookup_lexical(&self, query: &str, k: usize) -> Vec<IndexHit<'_>> {
        self.top_k(self.lexical.scores(query), k)
    }

    /// Top-k chunks by BM25 score among those containing at least `min_coverage`
    /// of the query's distinct terms.
    pub fn lookup_lexical_covering(&self, query: &str, k: usize, min_coverage: f32) -> Vec<IndexHit<'_>> {
        self.top_k(self.lexical.scores_with_coverage(query, min_coverage), k)
    }

    /// Top-k chunks by vector similarity.
    pub fn lookup_dense(&self, query_vector: &[f32], k: usize) -> Result<Vec<IndexHit<'_>>, AppError> {
        Ok(self.top_k(self.dense.similarities(query_vector)?, k))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshSummary {
    pub chunk_count: u32,
    pub embedded: u32,
    pub reused: u32,
    pub dims: u32,
    pub model: String,
    pub built_at: String,
}

/// Owns the active index snapshot and rebuilds it on `refresh`.
///
/// Readers clone the `Arc` under a short read lock and query it lock-free; a refresh
/// builds the replacement off to the side and swaps it in with one write. A failed
/// build leaves the previous snapshot active.
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    model: String,
    metric: DistanceMetric,
    active: RwLock<Option<Arc<IndexSnapshot>>>,
    refresh_lock: Mutex<()>,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn Embedder>, model: impl Into<String>, metric: DistanceMetric) -> Self {
        Self {
            embedder,
            model: model.into(),
            metric,
            active: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The active snapshot, or `INDEX_UNAVAILABLE` before the first refresh/install.
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>, AppError> {
        let guard = self
            .active
            .read()
            .map_err(|_| AppError::new(codes::INDEX_UNAVAILABLE, "Index lock poisoned"))?;
        guard.clone().ok_or_else(|| {
            AppError::new(
                codes::INDEX_UNAVAILABLE,
                "Index not ready; refresh the index before querying",
            )
        })
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_ok()
    }

    /// Make `snapshot` the active index (e.g. one loaded from disk).
    pub fn install(&self, snapshot: IndexSnapshot) -> Result<(), AppError> {
        let mut guard = self
            .active
            .write()
            .map_err(|_| AppError::new(codes::INDEX_BUILD_FAILED, "Index lock poisoned"))?;
        *guard = Some(Arc::new(snapshot));
        Ok(())
    }

    pub fn lookup_lexical(&self, query: &str, k: usize) -> Result<Vec<(Chunk, f32)>, AppError> {
        let snap = self.snapshot()?;
        Ok(snap
            .lookup_lexical(query, k)
            .into_iter()
            .map(|h| (h.chunk.clone(), h.score))
            .collect())
    }

    pub fn lookup_dense(&self, query_vector: &[f32], k: usize) -> Result<Vec<(Chunk, f32)>, AppError> {
        let snap = self.snapshot()?;
        let hits = snap.lookup_dense(query_vector, k)?;
        Ok(hits.into_iter().map(|h| (h.chunk.clone(), h.score)).collect())
    }

    /// Rebuild both indexes over `chunks` and swap them in.
    ///
    /// Vectors are reused from the active snapshot when the chunk id, text hash and
    /// embedding model are unchanged.
    #[tracing::instrument(skip_all, fields(chunks = chunks.len(), model = %self.model))]
    pub fn refresh(&self, mut chunks: Vec<Chunk>) -> Result<RefreshSummary, AppError> {
        let _guard = self
            .refresh_lock
            .lock()
            .map_err(|_| AppError::new(codes::INDEX_BUILD_FAILED, "Refresh lock poisoned"))?;

        if chunks.is_empty() {
            return Err(AppError::new(
                codes::INDEX_BUILD_FAILED,
                "No chunks available; add documents before refreshing the index",
            ));
        }

        chunks.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        let mut seen = BTreeSet::new();
        for c in &chunks {
            if !seen.insert(c.chunk_id.as_str()) {
                return Err(AppError::new(codes::INDEX_BUILD_FAILED, "Duplicate chunk id")
                    .with_details(format!("chunk_id={}", c.chunk_id)));
            }
        }

        let previous = self.snapshot().ok().filter(|s| s.model() == self.model);
        let reusable: BTreeMap<&str, (&str, &[f32])> = match previous.as_deref() {
            Some(prev) => prev
                .chunks()
                .iter()
                .enumerate()
                .filter_map(|(i, c)| {
                    prev.dense()
                        .vector(i)
                        .map(|v| (c.chunk_id.as_str(), (c.text_sha256.as_str(), v)))
                })
                .collect(),
            None => BTreeMap::new(),
        };

        let mut vectors = Vec::with_capacity(chunks.len());
        let mut embedded = 0u32;
        let mut reused = 0u32;
        for c in &chunks {
            match reusable.get(c.chunk_id.as_str()) {
                Some((hash, v)) if *hash == c.text_sha256 => {
                    vectors.push(v.to_vec());
                    reused += 1;
                }
                _ => {
                    let v = self.embedder.embed(&self.model, &c.text).map_err(|e| {
                        AppError::new(codes::EMBEDDING_FAILED, "Failed to compute embeddings")
                            .with_details(format!("chunk_id={}; err={}", c.chunk_id, e))
                            .with_retryable(e.retryable)
                    })?;
                    vectors.push(v);
                    embedded += 1;
                }
            }
        }

        let lexical = LexicalIndex::build(chunks.iter().map(|c| c.text.as_str()));
        let dense = DenseIndex::new(self.model.clone(), self.metric, vectors)?;
        let dims = dense.dims() as u32;
        let built_at = now_rfc3339();
        let snapshot = IndexSnapshot::from_parts(chunks, lexical, dense, built_at.clone())?;
        let chunk_count = snapshot.chunks().len() as u32;

        self.install(snapshot)?;
        tracing::info!(chunk_count, embedded, reused, dims, "index refreshed");

        Ok(RefreshSummary {
            chunk_count,
            embedded,
            reused,
            dims,
            model: self.model.clone(),
            built_at,
        })
    }
}
