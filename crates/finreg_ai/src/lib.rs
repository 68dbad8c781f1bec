pub mod answer;
pub mod assistant;
pub mod chunking;
pub mod embeddings;
pub mod guardrails;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod retrieve;
pub mod store;

pub use assistant::Assistant;
