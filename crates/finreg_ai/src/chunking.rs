use finreg_core::config::ChunkingConfig;
use finreg_core::domain::{Document, Regulator};
use finreg_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use crate::store::sha256_hex;

/// Boundary preference, strongest first. The separator stays with the chunk it ends.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Bounded, overlapping segment of one document; the unit of indexing and citation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub regulator: Regulator,
    pub doc_type: String,
    /// 0-based; contiguous within a document.
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Byte range of `text` within the document text.
    pub start: usize,
    pub end: usize,
    /// Leading bytes of `text` repeated from the previous chunk.
    pub overlap_prev: usize,
    pub text: String,
    pub text_sha256: String,
}

impl Chunk {
    /// `text` without the overlap carried over from the previous chunk.
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap_prev..]
    }
}

pub fn chunk_id_for(document_id: &str, chunk_index: u32) -> String {
    sha256_hex(format!("v1|{document_id}|{chunk_index}").as_bytes())
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self, AppError> {
        if config.chunk_size == 0 {
            return Err(AppError::new(
                codes::CHUNKING_FAILED,
                "chunk_size must be greater than zero",
            ));
        }
        if !(0.0..1.0).contains(&config.overlap_fraction) {
            return Err(
                AppError::new(codes::CHUNKING_FAILED, "overlap_fraction must be in [0, 1)")
                    .with_details(format!("overlap_fraction={}", config.overlap_fraction)),
            );
        }
        let overlap = (config.chunk_size as f64 * f64::from(config.overlap_fraction)).floor() as usize;
        Ok(Self {
            chunk_size: config.chunk_size,
            overlap: overlap.min(config.chunk_size - 1),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap in characters.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>, AppError> {
        let text = doc.text.as_str();
        if text.trim().is_empty() {
            return Err(AppError::new(codes::CHUNKING_FAILED, "Document text is empty")
                .with_details(format!("document_id={}", doc.id)));
        }

        let spans = self.split_spans(text);
        let total = spans.len() as u32;
        let chunks = spans
            .into_iter()
            .enumerate()
            .map(|(i, (start, end, overlap_prev))| {
                let chunk_text = text[start..end].to_string();
                Chunk {
                    chunk_id: chunk_id_for(&doc.id, i as u32),
                    document_id: doc.id.clone(),
                    regulator: doc.regulator,
                    doc_type: doc.doc_type.clone(),
                    chunk_index: i as u32,
                    total_chunks: total,
                    start,
                    end,
                    overlap_prev,
                    text_sha256: sha256_hex(chunk_text.as_bytes()),
                    text: chunk_text,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(document_id = %doc.id, chunks = chunks.len(), "document chunked");
        Ok(chunks)
    }

    /// Byte spans `(start, end, overlap_prev)` covering `text`.
    fn split_spans(&self, text: &str) -> Vec<(usize, usize, usize)> {
        // bounds[c] is the byte offset of char c; the last entry is text.len().
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let n_chars = bounds.len() - 1;
        // A soft break must leave a chunk longer than the overlap so the next start advances.
        let min_len = (self.overlap + 1).max(self.chunk_size / 2);

        let mut spans = Vec::new();
        let mut start_c = 0usize;
        let mut overlap_prev = 0usize;
        loop {
            let end_c = if n_chars - start_c <= self.chunk_size {
                n_chars
            } else {
                let window_end = start_c + self.chunk_size;
                let window = &text[bounds[start_c]..bounds[window_end]];
                soft_break(window, bounds[start_c], &bounds, start_c + min_len)
                    .unwrap_or(window_end)
            };

            spans.push((bounds[start_c], bounds[end_c], overlap_prev));
            if end_c == n_chars {
                break;
            }
            let next_start = (end_c - self.overlap).max(start_c + 1);
            overlap_prev = bounds[end_c] - bounds[next_start];
            start_c = next_start;
        }
        spans
    }
}

/// Char index just past the last occurrence of the strongest separator in `window`
/// that ends at or after `min_char`.
fn soft_break(window: &str, window_start: usize, bounds: &[usize], min_char: usize) -> Option<usize> {
    SEPARATORS.iter().find_map(|sep| {
        let idx = window.rfind(sep)?;
        bounds
            .binary_search(&(window_start + idx + sep.len()))
            .ok()
            .filter(|&c| c >= min_char)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("d.txt", Regulator::Sebi, "guideline", text).unwrap()
    }

    fn chunker(size: usize, fraction: f32) -> Chunker {
        Chunker::new(&ChunkingConfig {
            chunk_size: size,
            overlap_fraction: fraction,
        })
        .unwrap()
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunker(800, 0.125).chunk(&doc("Short text.")).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].overlap_prev, 0);
        assert_eq!(chunks[0].text, "Short text.");
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = chunker(40, 0.1).chunk(&doc(&text)).unwrap();
        assert!(chunks[0].text.ends_with("\n\n"));
        assert_eq!(chunks[0].text.trim_end(), "a".repeat(30));
    }

    #[test]
    fn hard_cut_respects_char_boundaries() {
        let text = "é".repeat(50);
        let chunks = chunker(16, 0.25).chunk(&doc(&text)).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 16);
        }
    }

    #[test]
    fn rejects_bad_configuration_and_empty_text() {
        assert!(Chunker::new(&ChunkingConfig {
            chunk_size: 0,
            overlap_fraction: 0.1
        })
        .is_err());
        let err = Chunker::new(&ChunkingConfig {
            chunk_size: 10,
            overlap_fraction: 1.0,
        })
        .unwrap_err();
        assert_eq!(err.code, codes::CHUNKING_FAILED);

        let err = chunker(10, 0.1).chunk(&doc("  \n ")).unwrap_err();
        assert_eq!(err.code, codes::CHUNKING_FAILED);
    }
}
