use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::domain::QueryResult;
use crate::error::{codes, AppError};

/// JSON file cache of answered queries, keyed by the exact query string.
///
/// The whole map is rewritten on each insert (tmp file then rename), so a crash
/// never leaves a half-written cache behind.
pub struct QueryCache {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl QueryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, QueryResult>, AppError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            AppError::new(codes::QUERY_CACHE_FAILED, "Failed to read query cache")
                .with_details(format!("path={}; err={}", self.path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::new(codes::QUERY_CACHE_FAILED, "Query cache is corrupt")
                .with_details(format!("path={}; err={}", self.path.display(), e))
        })
    }

    pub fn get(&self, query: &str) -> Result<Option<QueryResult>, AppError> {
        Ok(self.load()?.remove(query))
    }

    pub fn put(&self, query: &str, result: &QueryResult) -> Result<(), AppError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::new(codes::QUERY_CACHE_FAILED, "Query cache lock poisoned"))?;

        // A corrupt cache is replaced rather than blocking new entries.
        let mut map = self.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discarding unreadable query cache");
            BTreeMap::new()
        });
        map.insert(query.to_string(), result.clone());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::new(codes::QUERY_CACHE_FAILED, "Failed to create cache directory")
                    .with_details(format!("path={}; err={}", parent.display(), e))
            })?;
        }

        let json = serde_json::to_string_pretty(&map).map_err(|e| {
            AppError::new(codes::QUERY_CACHE_FAILED, "Failed to serialize query cache")
                .with_details(e.to_string())
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| {
            AppError::new(codes::QUERY_CACHE_FAILED, "Failed to write query cache")
                .with_details(format!("path={}; err={}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            AppError::new(codes::QUERY_CACHE_FAILED, "Failed to finalize query cache")
                .with_details(format!("path={}; err={}", self.path.display(), e))
        })?;
        Ok(())
    }

    /// Drop every cached answer. Returns how many entries were removed.
    pub fn clear(&self) -> Result<usize, AppError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::new(codes::QUERY_CACHE_FAILED, "Query cache lock poisoned"))?;

        let removed = self.load().map(|m| m.len()).unwrap_or(0);
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(removed),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(AppError::new(codes::QUERY_CACHE_FAILED, "Failed to clear query cache")
                .with_details(format!("path={}; err={}", self.path.display(), e))),
        }
    }
}
