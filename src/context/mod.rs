//! Context management: token accounting, structural chunking and compression
//!
//! Token estimation and chunking are pure and synchronous. The compressor
//! wraps an optional LLM completion backend and always produces a summary.

pub mod chunker;
pub mod completion;
pub mod compressor;
pub mod models;
pub mod token_budget;
pub mod token_estimator;

pub use chunker::{chunk_text_blocking, chunk_text_by_structure, chunk_words, merge_chunks, StructuralChunker};
pub use completion::{ChatMessage, CompletionClient, CompletionError, OpenAiCompletionClient};
pub use compressor::{fallback_summary, ContextCompressor};
pub use models::{Chunk, ChunkKind, ChunkMetadata};
pub use token_budget::{
    can_fit_in_context, count_message_tokens, estimate_tokens_left, truncate_text_to_fit, BudgetReport,
};
pub use token_estimator::{count_tokens, max_context, CharRatioEstimator, TiktokenEstimator, TokenEstimator};
