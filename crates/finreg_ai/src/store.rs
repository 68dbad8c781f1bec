use std::collections::BTreeMap;

use finreg_core::domain::Document;
use finreg_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chunking::{Chunk, Chunker};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSummary {
    pub document_count: u32,
    pub chunk_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RejectedDocument {
    pub document_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddDocumentsResult {
    pub added: Vec<String>,
    pub rejected: Vec<RejectedDocument>,
}

/// Documents and their chunks, keyed by document id.
///
/// Chunks are replaced wholesale whenever their document is re-added.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    documents: BTreeMap<String, Document>,
    chunks: BTreeMap<String, Vec<Chunk>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunk and store `doc`, replacing any previous version. Returns the chunk count.
    pub fn put_document(&mut self, doc: Document, chunker: &Chunker) -> Result<u32, AppError> {
        let chunks = chunker.chunk(&doc)?;
        let n = chunks.len() as u32;
        self.chunks.insert(doc.id.clone(), chunks);
        self.documents.insert(doc.id.clone(), doc);
        Ok(n)
    }

    /// Add many documents; a document that fails to chunk is reported and skipped.
    pub fn put_documents(&mut self, docs: Vec<Document>, chunker: &Chunker) -> AddDocumentsResult {
        let mut out = AddDocumentsResult::default();
        for doc in docs {
            let id = doc.id.clone();
            match self.put_document(doc, chunker) {
                Ok(_) => out.added.push(id),
                Err(e) => {
                    tracing::warn!(document_id = %id, error = %e, "document rejected");
                    out.rejected.push(RejectedDocument {
                        document_id: id,
                        code: e.code,
                        message: e.message,
                    });
                }
            }
        }
        out
    }

    pub fn remove_document(&mut self, id: &str) -> Option<Document> {
        self.chunks.remove(id);
        self.documents.remove(id)
    }

    pub fn get_document(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn chunks_for(&self, id: &str) -> &[Chunk] {
        self.chunks.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_chunk(&self, chunk_id: &str) -> Result<&Chunk, AppError> {
        self.chunks
            .values()
            .flatten()
            .find(|c| c.chunk_id == chunk_id)
            .ok_or_else(|| {
                AppError::new(codes::DOCUMENT_INVALID, "Chunk not found")
                    .with_details(format!("chunk_id={chunk_id}"))
            })
    }

    /// Every chunk, ordered by document id then chunk index.
    pub fn all_chunks(&self) -> Vec<Chunk> {
        self.chunks.values().flatten().cloned().collect()
    }

    pub fn document_ids(&self) -> Vec<String> {
        self.documents.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            document_count: self.documents.len() as u32,
            chunk_count: self.chunks.values().map(|c| c.len() as u32).sum(),
        }
    }
}
