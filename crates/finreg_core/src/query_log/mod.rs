use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::domain::QueryResult;
use crate::error::{codes, AppError};

const ANSWER_PREVIEW_CHARS: usize = 200;

/// Minimum number of shared words (exclusive) for a logged query to count as similar.
const SIMILAR_MIN_SHARED_WORDS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryLogEntry {
    pub ts: String,
    pub query: String,
    pub answer_preview: String,
    pub warning_count: u32,
    pub source_count: u32,
    pub model: String,
    pub degraded: bool,
    /// Served from the query cache without retrieval or generation.
    pub cached: bool,
}

impl QueryLogEntry {
    pub fn from_result(query: &str, result: &QueryResult, model: &str) -> Self {
        let mut preview: String = result.answer.chars().take(ANSWER_PREVIEW_CHARS).collect();
        if result.answer.chars().count() > ANSWER_PREVIEW_CHARS {
            preview.push_str("...");
        }
        Self {
            ts: result.timestamp.clone(),
            query: query.to_string(),
            answer_preview: preview,
            warning_count: result.warnings.len() as u32,
            source_count: result.sources.len() as u32,
            model: model.to_string(),
            degraded: result.is_degraded(),
            cached: false,
        }
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryStatistics {
    pub total_queries: u64,
    pub unique_queries: u64,
    pub degraded_queries: u64,
    pub cached_queries: u64,
    pub warnings_triggered: u64,
    pub avg_sources: f64,
    pub models_used: BTreeMap<String, u64>,
}

/// Append-only audit log of answered queries, stored in SQLite.
pub struct QueryLog {
    conn: Mutex<Connection>,
}

impl QueryLog {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let mut conn = db::open(path)?;
        db::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let mut conn = db::open_in_memory()?;
        db::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::new(codes::QUERY_LOG_FAILED, "Query log lock poisoned"))
    }

    pub fn append(&self, entry: &QueryLogEntry) -> Result<(), AppError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO query_log(ts, query, answer_preview, warning_count, source_count, model, degraded, cached)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.ts,
                entry.query,
                entry.answer_preview,
                entry.warning_count,
                entry.source_count,
                entry.model,
                entry.degraded as i64,
                entry.cached as i64,
            ],
        )
        .map_err(|e| {
            AppError::new(codes::QUERY_LOG_FAILED, "Failed to append query log entry")
                .with_details(e.to_string())
        })?;
        Ok(())
    }

    fn entries(&self, newest_first: bool) -> Result<Vec<QueryLogEntry>, AppError> {
        let conn = self.lock()?;
        let sql = if newest_first {
            "SELECT ts, query, answer_preview, warning_count, source_count, model, degraded, cached FROM query_log ORDER BY id DESC"
        } else {
            "SELECT ts, query, answer_preview, warning_count, source_count, model, degraded, cached FROM query_log ORDER BY id ASC"
        };
        let read_err = |e: rusqlite::Error| {
            AppError::new(codes::QUERY_LOG_FAILED, "Failed to read query log")
                .with_details(e.to_string())
        };
        let mut stmt = conn.prepare(sql).map_err(read_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(QueryLogEntry {
                    ts: row.get(0)?,
                    query: row.get(1)?,
                    answer_preview: row.get(2)?,
                    warning_count: row.get(3)?,
                    source_count: row.get(4)?,
                    model: row.get(5)?,
                    degraded: row.get::<_, i64>(6)? != 0,
                    cached: row.get::<_, i64>(7)? != 0,
                })
            })
            .map_err(read_err)?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(read_err)?);
        }
        Ok(out)
    }

    pub fn statistics(&self) -> Result<QueryStatistics, AppError> {
        let entries = self.entries(false)?;
        let mut stats = QueryStatistics::default();
        let mut unique: HashSet<&str> = HashSet::new();
        let mut total_sources = 0u64;

        for e in &entries {
            stats.total_queries += 1;
            unique.insert(e.query.as_str());
            *stats.models_used.entry(e.model.clone()).or_insert(0) += 1;
            stats.warnings_triggered += u64::from(e.warning_count);
            total_sources += u64::from(e.source_count);
            if e.degraded {
                stats.degraded_queries += 1;
            }
            if e.cached {
                stats.cached_queries += 1;
            }
        }

        stats.unique_queries = unique.len() as u64;
        if stats.total_queries > 0 {
            stats.avg_sources = total_sources as f64 / stats.total_queries as f64;
        }
        Ok(stats)
    }

    /// Previously logged queries sharing more than two words with `query`, newest first.
    pub fn similar_queries(&self, query: &str, k: usize) -> Result<Vec<String>, AppError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let words = word_set(query);
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut out = Vec::new();

        for e in self.entries(true)? {
            if e.query == query || seen.contains(&e.query) {
                continue;
            }
            let shared = word_set(&e.query).intersection(&words).count();
            if shared > SIMILAR_MIN_SHARED_WORDS {
                seen.insert(e.query.clone());
                out.push(e.query);
                if out.len() >= k {
                    break;
                }
            }
        }
        Ok(out)
    }
}

fn word_set(s: &str) -> HashSet<String> {
    s.split_whitespace().map(|w| w.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(query: &str, warnings: u32, sources: u32, model: &str) -> QueryLogEntry {
        QueryLogEntry {
            ts: "2026-01-01T00:00:00Z".to_string(),
            query: query.to_string(),
            answer_preview: "a".to_string(),
            warning_count: warnings,
            source_count: sources,
            model: model.to_string(),
            degraded: false,
            cached: false,
        }
    }

    #[test]
    fn statistics_aggregate_entries() {
        let log = QueryLog::open_in_memory().unwrap();
        log.append(&entry("q1", 1, 3, "m1")).unwrap();
        log.append(&entry("q1", 0, 1, "m1")).unwrap();
        log.append(&entry("q2", 2, 2, "m2").with_cached(true)).unwrap();

        let stats = log.statistics().unwrap();
        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.cached_queries, 1);
        assert_eq!(stats.unique_queries, 2);
        assert_eq!(stats.warnings_triggered, 3);
        assert!((stats.avg_sources - 2.0).abs() < 1e-9);
        assert_eq!(stats.models_used.get("m1"), Some(&2));
    }

    #[test]
    fn empty_log_has_zero_statistics() {
        let log = QueryLog::open_in_memory().unwrap();
        assert_eq!(log.statistics().unwrap(), QueryStatistics::default());
    }

    #[test]
    fn similar_queries_need_more_than_two_shared_words() {
        let log = QueryLog::open_in_memory().unwrap();
        log.append(&entry("how to open a demat account", 0, 0, "m")).unwrap();
        log.append(&entry("open demat account online", 0, 0, "m")).unwrap();
        log.append(&entry("what is upi", 0, 0, "m")).unwrap();

        let similar = log.similar_queries("How do I open a Demat Account", 5).unwrap();
        assert_eq!(
            similar,
            vec![
                "open demat account online".to_string(),
                "how to open a demat account".to_string()
            ]
        );
        assert!(log
            .similar_queries("how to open a demat account", 5)
            .unwrap()
            .iter()
            .all(|q| q != "how to open a demat account"));
    }

    #[test]
    fn preview_is_truncated() {
        let result = QueryResult::new("x".repeat(250), vec![], vec![], None);
        let e = QueryLogEntry::from_result("q", &result, "m");
        assert_eq!(e.answer_preview.chars().count(), 203);
        assert!(e.answer_preview.ends_with("..."));
    }
}
