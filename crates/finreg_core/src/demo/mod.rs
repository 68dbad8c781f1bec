use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Document;
use crate::error::{codes, AppError};
use crate::ingest::document_from_text;

macro_rules! corpus_file {
    ($rel:literal) => {
        (
            $rel,
            include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../corpus/", $rel)),
        )
    };
}

/// Small regulatory corpus bundled for demos and end-to-end tests.
/// Paths are relative to a raw corpus root; the first component names the regulator.
const SAMPLE_FILES: [(&str, &str); 5] = [
    corpus_file!("sebi/demat_account_guide.txt"),
    corpus_file!("sebi/trading_regulations.txt"),
    corpus_file!("rbi/payment_guidelines.txt"),
    corpus_file!("nse/investor_charter.txt"),
    corpus_file!("common_practices.txt"),
];

/// The bundled corpus as documents, ids are file names.
pub fn sample_documents() -> Result<Vec<Document>, AppError> {
    SAMPLE_FILES
        .iter()
        .map(|(rel, text)| {
            let path = Path::new(rel);
            let id = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| rel.to_string());
            document_from_text(&id, path, text)
        })
        .collect()
}

/// Write the bundled corpus under `dir`, creating regulator subdirectories.
pub fn write_sample_corpus(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut written = Vec::with_capacity(SAMPLE_FILES.len());
    for (rel, text) in SAMPLE_FILES {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::new(codes::INGEST_FAILED, "Failed to create corpus directory")
                    .with_details(format!("path={}; err={}", parent.display(), e))
            })?;
        }
        fs::write(&path, text).map_err(|e| {
            AppError::new(codes::INGEST_FAILED, "Failed to write sample document")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        written.push(path);
    }
    tracing::info!(count = written.len(), dir = %dir.display(), "sample corpus written");
    Ok(written)
}
