//! Request and response bodies for the HTTP API

use crate::context::Chunk;
use crate::memory::{SessionDescriptor, Turn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error codes returned in `ApiError::code`
pub mod error_codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Error body for every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    /// Whether summaries come from an LLM or the local fallback
    pub llm_compression: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub summary: Option<String>,
    pub messages: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    pub max_messages: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppendTurnRequest {
    pub agent: String,
    pub message: String,
    /// Agent payload; a bare string is accepted as the reply text
    #[serde(default)]
    pub response: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub session_id: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountTokensRequest {
    pub text: String,
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountTokensResponse {
    pub token_count: usize,
    pub model: String,
    pub max_context: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkTextRequest {
    pub text: String,
    pub max_tokens: Option<usize>,
    pub model: Option<String>,
    #[serde(default)]
    pub merge: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkTextResponse {
    pub chunks: Vec<Chunk>,
    pub chunk_count: usize,
    pub model: String,
    pub max_tokens_per_chunk: usize,
}
