//! Chat API handlers.
//!
//! Sessions and interactions belonging to another user are reported as not
//! found.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use cartwise_core::{Country, InteractionId, SessionId, UserId};

use crate::error::{AppError, Result};
use crate::middleware::CurrentUser;
use crate::models::{Session, TokenUsage};
use crate::services::TurnResult;
use crate::services::history::{self, HistoryEntry};
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Body of `POST /api/chat/sessions`. The body itself may be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Marketplace country; the configured default when absent.
    pub country: Option<String>,
}

/// Body of `POST /api/chat/sessions/{id}/messages`.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

/// A session with its app-facing history.
#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub history: Vec<HistoryEntry>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a new session for the caller.
#[instrument(skip(state, body), fields(user_id = %user_id))]
pub async fn create_session(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<Session>)> {
    let Json(body) = body.unwrap_or_default();
    let country = match body.country.as_deref() {
        Some(code) => Country::parse(code).map_err(|e| AppError::BadRequest(e.to_string()))?,
        None => state.config().marketplaces.default_country.clone(),
    };

    let session = state.store().create_session(user_id, &country).await?;
    info!(session_id = %session.id, country = %session.country, "session created");
    Ok((StatusCode::CREATED, Json(session)))
}

/// List the caller's sessions, newest first.
#[instrument(skip(state), fields(user_id = %user_id))]
pub async fn list_sessions(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<Session>>> {
    Ok(Json(state.store().list_sessions(user_id).await?))
}

/// Show a session with its history.
#[instrument(skip(state), fields(user_id = %user_id, session_id = %id))]
pub async fn show_session(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionView>> {
    let session = owned_session(&state, user_id, id).await?;
    let history = history::app_history(state.store(), id).await?;
    Ok(Json(SessionView { session, history }))
}

/// Send a message and run the first step of a turn.
#[instrument(skip(state, body), fields(user_id = %user_id, session_id = %id))]
pub async fn send_message(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<SessionId>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<TurnResult>> {
    let result = state
        .engine()
        .send_message(user_id, id, &body.message)
        .await?;
    Ok(Json(result))
}

/// Token totals of a session.
#[instrument(skip(state), fields(user_id = %user_id, session_id = %id))]
pub async fn session_usage(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<SessionId>,
) -> Result<Json<TokenUsage>> {
    owned_session(&state, user_id, id).await?;
    Ok(Json(state.store().token_usage(id).await?))
}

/// Continue a turn at its stored step.
#[instrument(skip(state), fields(user_id = %user_id, interaction_id = %id))]
pub async fn resume_interaction(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<InteractionId>,
) -> Result<Json<TurnResult>> {
    Ok(Json(state.engine().resume(user_id, id).await?))
}

/// Soft delete a turn so it no longer appears in history or replay.
#[instrument(skip(state), fields(user_id = %user_id, interaction_id = %id))]
pub async fn delete_interaction(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<InteractionId>,
) -> Result<StatusCode> {
    let interaction = state
        .store()
        .find_interaction(id)
        .await?
        .filter(|i| !i.is_deleted)
        .ok_or_else(|| AppError::NotFound("interaction".to_string()))?;
    match owned_session(&state, user_id, interaction.session_id).await {
        Err(AppError::NotFound(_)) => return Err(AppError::NotFound("interaction".to_string())),
        other => other?,
    };

    if state.store().soft_delete_interaction(id).await? {
        info!("interaction deleted");
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn owned_session(state: &AppState, user_id: UserId, id: SessionId) -> Result<Session> {
    state
        .store()
        .find_session(id)
        .await?
        .filter(|s| s.user_id == user_id && !s.is_disabled)
        .ok_or_else(|| AppError::NotFound("session".to_string()))
}
