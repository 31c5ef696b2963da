//! Router assembly

use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};
use crate::metrics::METRICS;

/// Build the full application router
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/memory/sessions", get(handlers::list_sessions))
        .route(
            "/memory/session/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/memory/session/:id/context", get(handlers::get_context))
        .route("/memory/session/:id/turns", post(handlers::append_turn))
        .route("/count-tokens", post(handlers::count_tokens_handler))
        .route("/chunk-text", post(handlers::chunk_text))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(track_requests)),
        )
        .with_state(state)
}

/// Record per-endpoint request counts and latency
async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    METRICS.record_http(&endpoint, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}
