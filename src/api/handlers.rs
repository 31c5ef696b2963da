//! HTTP handlers over the session memory store and the chunker

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::models::*;
use crate::config::ChunkerConfig;
use crate::context::{chunk_text_blocking, count_tokens, max_context, ContextCompressor};
use crate::error::ContextError;
use crate::memory::{AppendOutcome, RecentContext, SessionMemoryStore};
use crate::metrics::METRICS;

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionMemoryStore>,
    pub compressor: Arc<ContextCompressor>,
    pub chunker: ChunkerConfig,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn validation_error(message: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(error_codes::VALIDATION_ERROR, message)),
    )
}

fn session_not_found(session_id: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new(
            error_codes::NOT_FOUND,
            format!("Session not found: {}", session_id),
        )),
    )
}

fn internal_error(err: ContextError) -> (StatusCode, Json<ApiError>) {
    error!("Request failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new(error_codes::INTERNAL_ERROR, err.to_string())),
    )
}

fn store_error(err: ContextError) -> (StatusCode, Json<ApiError>) {
    match err {
        ContextError::NotFound(session_id) => session_not_found(&session_id),
        other => internal_error(other),
    }
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        sessions: state.store.session_count(),
        llm_compression: state.compressor.is_llm_backed(),
    })
}

/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}

/// GET /memory/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.store.list_sessions().await,
    })
}

/// GET /memory/session/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let record = state.store.require_session(&session_id).await.map_err(store_error)?;

    Ok(Json(SessionResponse {
        session_id: record.session_id,
        summary: record.summary,
        messages: record.messages,
    }))
}

/// GET /memory/session/:id/context
pub async fn get_context(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ContextQuery>,
) -> Json<RecentContext> {
    let max_messages = query
        .max_messages
        .unwrap_or(state.store.config().recent_context_messages);
    Json(state.store.recent_context(&session_id, max_messages).await)
}

/// POST /memory/session/:id/turns
pub async fn append_turn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<AppendTurnRequest>,
) -> ApiResult<AppendOutcome> {
    if request.agent.trim().is_empty() {
        return Err(validation_error("Agent cannot be empty"));
    }

    let outcome = state
        .store
        .append(&session_id, &request.agent, &request.message, request.response)
        .await;
    debug!("Turn appended: session={}, agent={}", outcome.session_id, request.agent);
    Ok(Json(outcome))
}

/// DELETE /memory/session/:id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<DeleteResponse> {
    if !state.store.delete(&session_id).await {
        return Err(session_not_found(&session_id));
    }
    Ok(Json(DeleteResponse {
        session_id,
        deleted: true,
    }))
}

/// POST /count-tokens
pub async fn count_tokens_handler(
    State(state): State<AppState>,
    Json(request): Json<CountTokensRequest>,
) -> ApiResult<CountTokensResponse> {
    if request.text.is_empty() {
        return Err(validation_error("Text cannot be empty"));
    }

    let model = request.model.unwrap_or(state.chunker.default_model);
    Ok(Json(CountTokensResponse {
        token_count: count_tokens(&request.text, &model),
        max_context: max_context(&model),
        model,
    }))
}

/// POST /chunk-text
pub async fn chunk_text(
    State(state): State<AppState>,
    Json(request): Json<ChunkTextRequest>,
) -> ApiResult<ChunkTextResponse> {
    if request.text.is_empty() {
        return Err(validation_error("Text cannot be empty"));
    }

    let max_tokens = request.max_tokens.unwrap_or(state.chunker.default_max_tokens);
    if max_tokens == 0 {
        return Err(validation_error("max_tokens must be positive"));
    }
    let model = request.model.unwrap_or(state.chunker.default_model);
    let text_len = request.text.len();

    let chunks = chunk_text_blocking(request.text, max_tokens, model.clone(), request.merge)
        .await
        .map_err(internal_error)?;

    METRICS.record_chunking(chunks.len());
    info!(
        "Chunked {} chars into {} chunks (model={}, max_tokens={})",
        text_len,
        chunks.len(),
        model,
        max_tokens
    );

    Ok(Json(ChunkTextResponse {
        chunk_count: chunks.len(),
        chunks,
        model,
        max_tokens_per_chunk: max_tokens,
    }))
}
