use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub const BM25_K1: f32 = 1.2;
pub const BM25_B: f32 = 0.75;

const STOPWORDS: &[&str] = &[
    "a", "about", "all", "also", "an", "and", "any", "are", "as", "at", "be", "by", "can",
    "could", "do", "does", "for", "from", "get", "has", "have", "how", "i", "if", "in", "into",
    "is", "it", "its", "may", "me", "my", "need", "no", "not", "of", "on", "or", "our",
    "should", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "to", "was", "we", "what", "when", "where", "which", "who", "why", "will", "with",
    "would", "you", "your",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Lowercase alphanumeric tokens of at least two chars, stopwords removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2 && !is_stopword(t))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Posting {
    pub entry: u32,
    pub tf: u32,
}

/// BM25 term index over index entries (one entry per chunk, same order as the snapshot).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LexicalIndex {
    postings: BTreeMap<String, Vec<Posting>>,
    doc_lens: Vec<u32>,
    avg_doc_len: f32,
}

impl LexicalIndex {
    pub fn build<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut postings: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
        let mut doc_lens = Vec::new();

        for (entry, text) in texts.into_iter().enumerate() {
            let tokens = tokenize(text);
            doc_lens.push(tokens.len() as u32);

            let mut tf: BTreeMap<String, u32> = BTreeMap::new();
            for t in tokens {
                *tf.entry(t).or_insert(0) += 1;
            }
            for (term, count) in tf {
                postings.entry(term).or_default().push(Posting {
                    entry: entry as u32,
                    tf: count,
                });
            }
        }

        let total: u64 = doc_lens.iter().map(|l| u64::from(*l)).sum();
        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            total as f32 / doc_lens.len() as f32
        };

        Self {
            postings,
            doc_lens,
            avg_doc_len,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    pub fn doc_freq(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    /// Positive BM25 scores for `query`, unordered. Repeated query terms count once.
    pub fn scores(&self, query: &str) -> Vec<(usize, f32)> {
        self.scores_with_coverage(query, 0.0)
    }

    /// Like [`scores`](Self::scores), keeping only entries that contain at least
    /// `min_coverage` of the query's distinct terms. Coverage is checked on raw term
    /// matches, before any normalization, so one shared word cannot carry a long query.
    pub fn scores_with_coverage(&self, query: &str, min_coverage: f32) -> Vec<(usize, f32)> {
        let n = self.doc_lens.len() as f32;
        if n == 0.0 || self.avg_doc_len == 0.0 {
            return Vec::new();
        }

        let terms: BTreeSet<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() {
            return Vec::new();
        }
        let mut acc = vec![0.0f32; self.doc_lens.len()];
        let mut matched = vec![0u32; self.doc_lens.len()];
        for term in &terms {
            let Some(list) = self.postings.get(term) else {
                continue;
            };
            let df = list.len() as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for p in list {
                let tf = p.tf as f32;
                let dl = self.doc_lens[p.entry as usize] as f32;
                let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * dl / self.avg_doc_len);
                acc[p.entry as usize] += idf * tf * (BM25_K1 + 1.0) / (tf + norm);
                matched[p.entry as usize] += 1;
            }
        }

        let total = terms.len() as f32;
        acc.into_iter()
            .zip(matched)
            .enumerate()
            .filter(|(_, (s, m))| *s > 0.0 && *m as f32 / total >= min_coverage)
            .map(|(i, (s, _))| (i, s))
            .collect()
    }
}
