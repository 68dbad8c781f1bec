use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use finreg_core::config::RetrievalConfig;
use finreg_core::error::AppError;
use serde::{Deserialize, Serialize};

use crate::chunking::Chunk;
use crate::index::{IndexHit, Indexer};

pub mod similarity;

pub const MAX_TOP_K: u32 = 50;

/// One entry of a sub-ranking fed to [`merge_rankings`].
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: u32,
    pub score: f32,
}

impl From<&IndexHit<'_>> for Candidate {
    fn from(h: &IndexHit<'_>) -> Self {
        Self {
            chunk_id: h.chunk.chunk_id.clone(),
            document_id: h.chunk.document_id.clone(),
            chunk_index: h.chunk.chunk_index,
            score: h.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergedCandidate {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: u32,
    /// Combined score in `[0, 1]`.
    pub score: f32,
    /// Max-normalized sub-scores (0 when absent from that ranking).
    pub lexical: f32,
    pub dense: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeParams {
    pub lexical_weight: f32,
    pub min_relevance: f32,
    pub top_k: usize,
}

fn max_score(list: &[Candidate]) -> f32 {
    list.iter().map(|c| c.score).fold(0.0f32, f32::max)
}

/// Merge a lexical and a dense ranking into one list.
///
/// Each ranking is divided by its own max, then combined as
/// `w * lexical + (1 - w) * dense`. Candidates are deduplicated by chunk id, must
/// score strictly above `min_relevance`, and are ordered score desc with ties broken
/// by chunk index, document id, chunk id.
pub fn merge_rankings(
    lexical: &[Candidate],
    dense: &[Candidate],
    params: &MergeParams,
) -> Vec<MergedCandidate> {
    let w = params.lexical_weight.clamp(0.0, 1.0);
    let mut merged: BTreeMap<&str, MergedCandidate> = BTreeMap::new();

    for (list, is_lexical) in [(lexical, true), (dense, false)] {
        let max = max_score(list);
        if max <= 0.0 {
            continue;
        }
        for c in list {
            if c.score <= 0.0 {
                continue;
            }
            let norm = (c.score / max).min(1.0);
            let m = merged.entry(c.chunk_id.as_str()).or_insert_with(|| MergedCandidate {
                chunk_id: c.chunk_id.clone(),
                document_id: c.document_id.clone(),
                chunk_index: c.chunk_index,
                score: 0.0,
                lexical: 0.0,
                dense: 0.0,
            });
            // Duplicates within one ranking keep their best score.
            if is_lexical {
                m.lexical = m.lexical.max(norm);
            } else {
                m.dense = m.dense.max(norm);
            }
        }
    }

    let mut out: Vec<MergedCandidate> = merged
        .into_values()
        .map(|mut m| {
            m.score = (w * m.lexical + (1.0 - w) * m.dense).clamp(0.0, 1.0);
            m
        })
        .filter(|m| m.score > params.min_relevance)
        .collect();

    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    out.truncate(params.top_k);
    out
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub lexical: f32,
    pub dense: f32,
}

pub struct Retriever {
    indexer: Arc<Indexer>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(indexer: Arc<Indexer>, config: RetrievalConfig) -> Self {
        Self { indexer, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Result count a request for `top_k` resolves to: the configured default when
    /// unset, clamped to `[1, 50]`.
    pub fn effective_top_k(&self, top_k: Option<u32>) -> usize {
        top_k.unwrap_or(self.config.top_k).clamp(1, MAX_TOP_K) as usize
    }

    /// Ranked chunks for `query`, at most `top_k` (default from config, clamped to `[1, 50]`).
    ///
    /// Fails only with `INDEX_UNAVAILABLE`; an empty query or no match is an empty list.
    #[tracing::instrument(skip(self))]
    pub fn retrieve(&self, query: &str, top_k: Option<u32>) -> Result<Vec<RetrievedChunk>, AppError> {
        let top_k = self.effective_top_k(top_k);

        // Both lookups run against the same snapshot.
        let snap = self.indexer.snapshot()?;
        let q = query.trim();
        if q.is_empty() {
            return Ok(Vec::new());
        }
        let pool = (self.config.candidate_pool as usize).max(top_k);

        let lexical: Vec<Candidate> = snap
            .lookup_lexical_covering(q, pool, self.config.lexical_min_term_coverage)
            .iter()
            .map(Candidate::from)
            .collect();

        let dense_floor = self.config.dense_floor(snap.dense().metric());
        let dense: Vec<Candidate> = match self.indexer.embedder().embed(snap.model(), q) {
            Ok(qv) => match snap.lookup_dense(&qv, pool) {
                Ok(hits) => hits
                    .iter()
                    .filter(|h| h.score >= dense_floor)
                    .map(Candidate::from)
                    .collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "dense lookup failed; using lexical results only");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed; using lexical results only");
                Vec::new()
            }
        };

        let merged = merge_rankings(
            &lexical,
            &dense,
            &MergeParams {
                lexical_weight: self.config.lexical_weight,
                min_relevance: self.config.min_relevance,
                top_k,
            },
        );
        tracing::debug!(
            lexical = lexical.len(),
            dense = dense.len(),
            merged = merged.len(),
            "retrieval candidates"
        );

        let by_id: BTreeMap<&str, &Chunk> = snap
            .chunks()
            .iter()
            .map(|c| (c.chunk_id.as_str(), c))
            .collect();
        Ok(merged
            .into_iter()
            .filter_map(|m| {
                by_id.get(m.chunk_id.as_str()).map(|c| RetrievedChunk {
                    chunk: (*c).clone(),
                    score: m.score,
                    lexical: m.lexical,
                    dense: m.dense,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cand(id: &str, doc: &str, idx: u32, score: f32) -> Candidate {
        Candidate {
            chunk_id: id.to_string(),
            document_id: doc.to_string(),
            chunk_index: idx,
            score,
        }
    }

    fn params(top_k: usize) -> MergeParams {
        MergeParams {
            lexical_weight: 0.5,
            min_relevance: 0.05,
            top_k,
        }
    }

    #[test]
    fn merge_normalizes_and_combines() {
        let lex = vec![cand("a", "d1", 0, 4.0), cand("b", "d1", 1, 2.0)];
        let dense = vec![cand("b", "d1", 1, 0.8), cand("c", "d2", 0, 0.4)];
        let out = merge_rankings(&lex, &dense, &params(10));
        let ids: Vec<&str> = out.iter().map(|m| m.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!((out[0].score - 0.75).abs() < 1e-6);
        assert!((out[1].score - 0.5).abs() < 1e-6);
        assert!((out[2].score - 0.25).abs() < 1e-6);
    }

    #[test]
    fn merge_breaks_ties_by_chunk_index_then_document() {
        let lex = vec![
            cand("x", "zeta.txt", 0, 1.0),
            cand("y", "alpha.txt", 3, 1.0),
            cand("z", "alpha.txt", 0, 1.0),
        ];
        let out = merge_rankings(&lex, &[], &params(10));
        let ids: Vec<&str> = out.iter().map(|m| m.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "x", "y"]);
    }

    #[test]
    fn merge_drops_low_scores_and_truncates() {
        let lex = vec![cand("a", "d", 0, 10.0), cand("b", "d", 1, 0.5), cand("c", "d", 2, 5.0)];
        let out = merge_rankings(&lex, &[], &params(1));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].chunk_id, "a");

        let out = merge_rankings(&lex, &[], &params(10));
        // b normalizes to 0.05 * 0.5 = 0.025, below the floor.
        assert_eq!(out.len(), 2);
        assert!(merge_rankings(&[], &[], &params(3)).is_empty());
    }

    #[test]
    fn merge_deduplicates_within_a_ranking() {
        let lex = vec![cand("a", "d", 0, 2.0), cand("a", "d", 0, 1.0)];
        let out = merge_rankings(&lex, &[], &params(10));
        assert_eq!(out.len(), 1);
        assert!(out.iter().all(|m| (0.0..=1.0).contains(&m.score)));
    }
}
