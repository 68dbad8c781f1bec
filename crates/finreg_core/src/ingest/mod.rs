use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Document, Regulator};
use crate::error::{codes, AppError};

const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "text", "md"];

/// How far into a document doc-type detection looks.
const DETECTION_WINDOW_CHARS: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusLoad {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

/// Normalize extracted text: line endings, whitespace runs, common mojibake and
/// control characters. Paragraph breaks (`\n\n`) are preserved for chunking.
pub fn clean_text(raw: &str) -> String {
    let mut s = raw.replace("\r\n", "\n").replace('\r', "\n");
    for (bad, good) in [
        ("ï¬\u{81}", "fi"),
        ("ï¬‚", "fl"),
        ("ï¬€", "ff"),
        ("ï¬ƒ", "ffi"),
        ("ï¬„", "ffl"),
        ("\u{fb01}", "fi"),
        ("\u{fb02}", "fl"),
        ("\u{201c}", "\""),
        ("\u{201d}", "\""),
        ("\u{2018}", "'"),
        ("\u{2019}", "'"),
    ] {
        s = s.replace(bad, good);
    }

    let mut lines: Vec<String> = Vec::new();
    for line in s.split('\n') {
        let mut out = String::with_capacity(line.len());
        let mut prev_space = false;
        for ch in line.chars() {
            if ch == ' ' || ch == '\t' || ch == '\u{a0}' {
                if !prev_space {
                    out.push(' ');
                }
                prev_space = true;
            } else if ch.is_control() {
                continue;
            } else {
                out.push(ch);
                prev_space = false;
            }
        }
        lines.push(out.trim_end().to_string());
    }

    // At most one blank line between paragraphs.
    let mut out = String::with_capacity(s.len());
    let mut blank_run = 0usize;
    for line in lines {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(&line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// Regulator inferred from any path component (`.../sebi/...` -> SEBI).
pub fn detect_regulator(path: &Path) -> Regulator {
    let p = path.to_string_lossy().to_lowercase();
    if p.contains("sebi") {
        Regulator::Sebi
    } else if p.contains("rbi") {
        Regulator::Rbi
    } else if p.contains("nse") {
        Regulator::Nse
    } else if p.contains("bse") {
        Regulator::Bse
    } else {
        Regulator::Other
    }
}

pub fn detect_doc_type(regulator: Regulator, text: &str) -> String {
    let head: String = text.chars().take(DETECTION_WINDOW_CHARS).collect::<String>().to_lowercase();
    let t = match regulator {
        Regulator::Sebi => {
            if head.contains("regulation") {
                "regulation"
            } else if head.contains("circular") {
                "circular"
            } else if head.contains("guideline") {
                "guideline"
            } else if head.contains("notification") {
                "notification"
            } else if head.contains("consultation") {
                "consultation_paper"
            } else {
                "other"
            }
        }
        Regulator::Rbi => {
            if head.contains("master direction") {
                "master_direction"
            } else if head.contains("circular") {
                "circular"
            } else if head.contains("notification") {
                "notification"
            } else if head.contains("faq") {
                "faq"
            } else {
                "other"
            }
        }
        Regulator::Nse => "circular",
        Regulator::Bse => "notice",
        Regulator::Other | Regulator::Unknown => "general",
    };
    t.to_string()
}

/// Build a document from extracted text, inferring regulator and doc type from `path`.
pub fn document_from_text(id: &str, path: &Path, raw: &str) -> Result<Document, AppError> {
    let text = clean_text(raw);
    if text.is_empty() {
        return Err(AppError::new(codes::INGEST_FAILED, "Document has no text after cleaning")
            .with_details(format!("path={}", path.display())));
    }
    let regulator = detect_regulator(path);
    let doc_type = detect_doc_type(regulator, &text);
    Document::new(id, regulator, doc_type, text)
}

fn collect_text_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(p) = stack.pop() {
        let entries = match fs::read_dir(&p) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for ent in entries.flatten() {
            let path = ent.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

/// Load every supported text file under `root`.
///
/// Unsupported, unreadable or empty files are reported in `skipped` rather than
/// failing the whole load. Document ids are file names; a repeated file name falls
/// back to the path relative to `root`.
pub fn load_corpus_dir(root: &Path) -> Result<CorpusLoad, AppError> {
    if !root.is_dir() {
        return Err(AppError::new(codes::INGEST_FAILED, "Corpus root must be a directory")
            .with_details(format!("path={}", root.display())));
    }

    let mut documents = Vec::new();
    let mut skipped = Vec::new();
    let mut used_ids: BTreeSet<String> = BTreeSet::new();

    for path in collect_text_files(root) {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            tracing::debug!(path = %path.display(), "skipping unsupported file type");
            skipped.push(SkippedFile {
                path: path.display().to_string(),
                reason: format!("unsupported extension: {ext:?}"),
            });
            continue;
        }

        let raw = match fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read corpus file");
                skipped.push(SkippedFile {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let rel = path.strip_prefix(root).unwrap_or(&path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| rel.display().to_string());
        let id = if used_ids.contains(&file_name) {
            rel.display().to_string()
        } else {
            file_name
        };

        match document_from_text(&id, rel, &raw) {
            Ok(doc) => {
                used_ids.insert(doc.id.clone());
                documents.push(doc);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping corpus file");
                skipped.push(SkippedFile {
                    path: path.display().to_string(),
                    reason: e.message,
                });
            }
        }
    }

    tracing::info!(
        documents = documents.len(),
        skipped = skipped.len(),
        root = %root.display(),
        "corpus loaded"
    );
    Ok(CorpusLoad { documents, skipped })
}
