use std::sync::Arc;

use finreg_core::compliance::PatternTable;
use finreg_core::domain::{QueryResult, SourceCitation, Warning};
use finreg_core::error::{codes, AppError};

use crate::chunking::Chunk;
use crate::guardrails::{merge_warnings, screen_answer, source_marker, unknown_citations};
use crate::llm::Llm;
use crate::retrieve::RetrievedChunk;

pub mod prompts;

pub fn citation_for_chunk(chunk: &Chunk) -> SourceCitation {
    SourceCitation {
        name: chunk.document_id.clone(),
        regulator: chunk.regulator,
        doc_type: chunk.doc_type.clone(),
        chunk: chunk.chunk_index + 1,
        total_chunks: chunk.total_chunks,
    }
}

/// Result carrying the fallback answer for a failed query.
pub fn degraded_result(answer: &str, warnings: Vec<Warning>, err: &AppError) -> QueryResult {
    QueryResult::new(answer, warnings, Vec::new(), Some(err.to_string()))
}

/// Builds the prompt from ranked chunks, calls the generator and assembles the result.
pub struct AnswerComposer {
    llm: Arc<dyn Llm>,
    model: String,
    max_context_chars: usize,
    response_screen: Option<PatternTable>,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn Llm>, model: impl Into<String>, max_context_chars: usize) -> Self {
        Self {
            llm,
            model: model.into(),
            max_context_chars,
            response_screen: None,
        }
    }

    /// Screen generated answers with `table`, adding its warnings to the result.
    pub fn with_response_screen(mut self, table: PatternTable) -> Self {
        self.response_screen = Some(table);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn response_screen(&self) -> Option<&PatternTable> {
        self.response_screen.as_ref()
    }

    /// Leading chunks (rank order) whose texts fit the context budget; never empty
    /// when `chunks` is not.
    pub fn select_context<'a>(&self, chunks: &'a [RetrievedChunk]) -> &'a [RetrievedChunk] {
        let mut used = 0usize;
        let mut n = 0usize;
        for rc in chunks {
            let len = rc.chunk.text.chars().count();
            if n > 0 && used + len > self.max_context_chars {
                break;
            }
            used += len;
            n += 1;
        }
        &chunks[..n]
    }

    pub fn build_prompt(&self, question: &str, included: &[RetrievedChunk]) -> String {
        let blocks = included
            .iter()
            .enumerate()
            .map(|(i, rc)| {
                let c = &rc.chunk;
                format!(
                    "{} {} ({}, {}) chunk {}/{}\n{}",
                    source_marker(i + 1),
                    c.document_id,
                    c.regulator,
                    c.doc_type,
                    c.chunk_index + 1,
                    c.total_chunks,
                    c.text.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        prompts::answer_prompt(question.trim(), &blocks)
    }

    /// Never fails: generation errors become a degraded result with empty sources.
    #[tracing::instrument(skip_all, fields(chunks = chunks.len()))]
    pub fn compose(&self, question: &str, chunks: &[RetrievedChunk], warnings: Vec<Warning>) -> QueryResult {
        if chunks.is_empty() {
            tracing::info!("no relevant context; declining to answer");
            return QueryResult::new(prompts::NO_CONTEXT_ANSWER, warnings, Vec::new(), None);
        }

        let included = self.select_context(chunks);
        let prompt = self.build_prompt(question, included);

        let answer = self
            .llm
            .generate(&self.model, &prompt)
            .and_then(|a| {
                if a.trim().is_empty() {
                    Err(AppError::new(codes::GENERATION_FAILED, "Generation returned an empty answer"))
                } else {
                    Ok(a.trim().to_string())
                }
            });

        let answer = match answer {
            Ok(a) => a,
            Err(e) => {
                let e = if e.is(codes::GENERATION_FAILED) {
                    e
                } else {
                    AppError::new(codes::GENERATION_FAILED, "Answer generation failed")
                        .with_details(e.to_string())
                        .with_retryable(e.retryable)
                };
                tracing::warn!(error = %e, retryable = e.retryable, "generation failed; returning fallback answer");
                return degraded_result(prompts::FALLBACK_ANSWER, warnings, &e);
            }
        };

        let stray = unknown_citations(&answer, included.len());
        if !stray.is_empty() {
            tracing::warn!(?stray, "answer cites sources that were not provided");
        }

        let mut warnings = warnings;
        if let Some(table) = self.response_screen.as_ref() {
            merge_warnings(&mut warnings, screen_answer(&answer, table));
        }

        let sources = included.iter().map(|rc| citation_for_chunk(&rc.chunk)).collect();
        QueryResult::new(answer, warnings, sources, None)
    }
}
