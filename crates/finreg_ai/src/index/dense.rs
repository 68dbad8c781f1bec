use finreg_core::config::DistanceMetric;
use finreg_core::error::{codes, AppError};

use crate::retrieve::similarity::{cosine_similarity, l2_distance, l2_norm};

/// Embedding vectors, one per index entry, produced by a single model.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseIndex {
    model: String,
    dims: usize,
    metric: DistanceMetric,
    vectors: Vec<Vec<f32>>,
    norms: Vec<f32>,
}

impl DenseIndex {
    pub fn new(
        model: impl Into<String>,
        metric: DistanceMetric,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, AppError> {
        let dims = vectors.first().map_or(0, Vec::len);
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
            return Err(AppError::new(
                codes::INDEX_BUILD_FAILED,
                "Embedding dimension mismatch across chunks",
            )
            .with_details(format!("expected={dims}; got={}; entry={i}", v.len())));
        }
        let norms = vectors.iter().map(|v| l2_norm(v)).collect();
        Ok(Self {
            model: model.into(),
            dims,
            metric,
            vectors,
            norms,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vector(&self, entry: usize) -> Option<&[f32]> {
        self.vectors.get(entry).map(Vec::as_slice)
    }

    /// Similarity of every non-zero entry to `query`, unordered, in `(0, 1]` for L2
    /// and `[-1, 1]` for cosine. A zero query vector matches nothing under either metric.
    pub fn similarities(&self, query: &[f32]) -> Result<Vec<(usize, f32)>, AppError> {
        if self.vectors.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(AppError::new(
                codes::EMBEDDING_FAILED,
                "Query embedding dims do not match index dims",
            )
            .with_details(format!("index_dims={}; query_dims={}", self.dims, query.len())));
        }

        let qnorm = l2_norm(query);
        if qnorm == 0.0 {
            return Ok(Vec::new());
        }
        // Zero vectors carry no signal under either metric.
        let entries = self
            .vectors
            .iter()
            .zip(self.norms.iter())
            .enumerate()
            .filter(|(_, (_, n))| **n > 0.0);
        let out = match self.metric {
            DistanceMetric::Cosine => entries
                .map(|(i, (v, n))| (i, cosine_similarity(query, v, qnorm, *n)))
                .collect(),
            DistanceMetric::L2 => entries
                .map(|(i, (v, _))| (i, 1.0 / (1.0 + l2_distance(query, v))))
                .collect(),
        };
        Ok(out)
    }
}
