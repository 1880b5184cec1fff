//! HTTP route handlers for the assistant.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                              - Liveness check
//! GET    /health/ready                        - Readiness check (database)
//!
//! # Chat (caller identified by x-user-id)
//! POST   /api/chat/sessions                   - Create session
//! GET    /api/chat/sessions                   - List caller's sessions
//! GET    /api/chat/sessions/{id}              - Session with history
//! POST   /api/chat/sessions/{id}/messages     - Send a message (starts a turn)
//! GET    /api/chat/sessions/{id}/usage        - Token totals
//! POST   /api/chat/interactions/{id}/resume   - Continue a turn
//! DELETE /api/chat/interactions/{id}          - Soft delete a turn
//! ```

pub mod chat;
pub mod health;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the chat API router.
pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/sessions",
            post(chat::create_session).get(chat::list_sessions),
        )
        .route("/sessions/{id}", get(chat::show_session))
        .route("/sessions/{id}/messages", post(chat::send_message))
        .route("/sessions/{id}/usage", get(chat::session_usage))
        .route("/interactions/{id}/resume", post(chat::resume_interaction))
        .route("/interactions/{id}", delete(chat::delete_interaction))
}

/// Create all routes for the assistant.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/chat", chat_routes())
}

/// Build the application with tracing and request ids applied.
///
/// Sentry layers are added by the binary.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}
