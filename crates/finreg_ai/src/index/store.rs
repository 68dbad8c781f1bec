use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use finreg_core::config::DistanceMetric;
use finreg_core::error::{codes, AppError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{DenseIndex, IndexSnapshot, LexicalIndex};
use crate::chunking::Chunk;

/// Persistence collaborator for index snapshots.
pub trait IndexPersistence {
    fn save(&self, snapshot: &IndexSnapshot) -> Result<IndexStatus, AppError>;
    fn load(&self) -> Result<IndexSnapshot, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStatus {
    pub ready: bool,
    pub model: Option<String>,
    pub dims: Option<u32>,
    #[serde(default)]
    pub metric: Option<DistanceMetric>,
    pub chunk_count: u32,
    pub updated_at: Option<String>,
}

impl IndexStatus {
    fn not_ready() -> Self {
        Self {
            ready: false,
            model: None,
            dims: None,
            metric: None,
            chunk_count: 0,
            updated_at: None,
        }
    }
}

/// JSON files under one directory; `index_status.json` is written last and marks
/// the other files as a complete set.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn status_path(&self) -> PathBuf {
        self.root.join("index_status.json")
    }

    fn chunks_path(&self) -> PathBuf {
        self.root.join("index_chunks.json")
    }

    fn vectors_path(&self) -> PathBuf {
        self.root.join("index_vectors.json")
    }

    fn lexical_path(&self) -> PathBuf {
        self.root.join("index_lexical.json")
    }

    fn ensure_dirs(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            AppError::new(codes::INDEX_BUILD_FAILED, "Failed to create index directory")
                .with_details(format!("path={}; err={}", self.root.display(), e))
        })
    }

    pub fn status(&self) -> Result<IndexStatus, AppError> {
        let path = self.status_path();
        if !path.exists() {
            return Ok(IndexStatus::not_ready());
        }
        read_json(&path, "index status")
    }

    fn write_status(&self, st: &IndexStatus) -> Result<(), AppError> {
        write_json(&self.status_path(), st, "index status")
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, what: &str) -> Result<(), AppError> {
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_string(value).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, format!("Failed to encode {what}"))
            .with_details(e.to_string())
    })?;
    fs::write(&tmp, json.as_bytes()).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, format!("Failed to write {what}"))
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, format!("Failed to finalize {what} write"))
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, AppError> {
    let bytes = fs::read(path).map_err(|e| {
        AppError::new(codes::INDEX_UNAVAILABLE, format!("Failed to read {what}"))
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::new(codes::INDEX_UNAVAILABLE, format!("Failed to decode {what}"))
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

impl IndexPersistence for IndexStore {
    fn save(&self, snapshot: &IndexSnapshot) -> Result<IndexStatus, AppError> {
        self.ensure_dirs()?;

        // Invalidate first so a crash mid-save never pairs old status with new files.
        self.write_status(&IndexStatus::not_ready())?;

        let vectors: BTreeMap<&str, &[f32]> = snapshot
            .chunks()
            .iter()
            .enumerate()
            .filter_map(|(i, c)| snapshot.dense().vector(i).map(|v| (c.chunk_id.as_str(), v)))
            .collect();

        write_json(&self.chunks_path(), snapshot.chunks(), "index chunks")?;
        write_json(&self.vectors_path(), &vectors, "index vectors")?;
        write_json(&self.lexical_path(), snapshot.lexical(), "lexical index")?;

        let status = IndexStatus {
            ready: true,
            model: Some(snapshot.model().to_string()),
            dims: Some(snapshot.dense().dims() as u32),
            metric: Some(snapshot.dense().metric()),
            chunk_count: snapshot.chunks().len() as u32,
            updated_at: Some(snapshot.built_at().to_string()),
        };
        self.write_status(&status)?;
        tracing::info!(path = %self.root.display(), chunk_count = status.chunk_count, "index saved");
        Ok(status)
    }

    fn load(&self) -> Result<IndexSnapshot, AppError> {
        let st = self.status()?;
        if !st.ready {
            return Err(AppError::new(
                codes::INDEX_UNAVAILABLE,
                "No committed index on disk",
            )
            .with_details(format!("path={}", self.root.display())));
        }
        let model = st
            .model
            .clone()
            .ok_or_else(|| AppError::new(codes::INDEX_UNAVAILABLE, "Index status missing model"))?;

        let chunks: Vec<Chunk> = read_json(&self.chunks_path(), "index chunks")?;
        let mut vectors: BTreeMap<String, Vec<f32>> = read_json(&self.vectors_path(), "index vectors")?;
        let lexical: LexicalIndex = read_json(&self.lexical_path(), "lexical index")?;

        if chunks.len() as u32 != st.chunk_count {
            return Err(AppError::new(
                codes::INDEX_UNAVAILABLE,
                "Index chunk count does not match status",
            )
            .with_details(format!("status={}; chunks={}", st.chunk_count, chunks.len())));
        }

        let mut ordered = Vec::with_capacity(chunks.len());
        for c in &chunks {
            let v = vectors.remove(&c.chunk_id).ok_or_else(|| {
                AppError::new(codes::INDEX_UNAVAILABLE, "Index vector missing for chunk")
                    .with_details(format!("chunk_id={}", c.chunk_id))
            })?;
            ordered.push(v);
        }

        let dense = DenseIndex::new(model, st.metric.unwrap_or(DistanceMetric::Cosine), ordered)?;
        if st.dims.is_some_and(|d| d as usize != dense.dims()) {
            return Err(AppError::new(
                codes::INDEX_UNAVAILABLE,
                "Index vector dims do not match status",
            ));
        }
        let snapshot = IndexSnapshot::from_parts(
            chunks,
            lexical,
            dense,
            st.updated_at.unwrap_or_default(),
        )?;
        tracing::info!(path = %self.root.display(), chunk_count = st.chunk_count, "index loaded");
        Ok(snapshot)
    }
}
