//! Session lifecycle endpoints: handshake, execute, status, close, plus the
//! caller's session list and full transcript.

use std::path::PathBuf;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::api::auth::{Caller, Meta};
use crate::api::error::{body, ApiError};
use crate::runtime::broker::ExecuteRequest;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /handshake
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Open a session for the authenticated client.
pub async fn handshake(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Meta(meta): Meta,
) -> impl IntoResponse {
    let entry = state.sessions.open(&caller, &meta);
    Json(serde_json::json!({
        "session_id": entry.session_id,
        "client_id": entry.client_id,
        "status": entry.state,
        "created_at": entry.created_at,
        "last_activity": entry.last_activity,
        "expires_at": entry.expires_at(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /execute
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    pub session_id: String,
    #[serde(alias = "request")]
    pub prompt: String,
    /// Working directory for the agent.
    #[serde(default)]
    pub project_path: Option<PathBuf>,
}

/// Run a prompt. Agent failures (timeout, non-zero exit, launch error) are
/// reported in the body of a 200 response; they are session events, not
/// request errors.
pub async fn execute(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Meta(meta): Meta,
    payload: Result<Json<ExecuteBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    let session_id = req.session_id.clone();
    let out = state
        .sessions
        .execute(
            &caller,
            &meta,
            ExecuteRequest {
                session_id: req.session_id,
                prompt: req.prompt,
                project_path: req.project_path,
            },
        )
        .await?;

    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "message": out.message,
        "exit": out.result.exit,
        "error": out.result.error,
        "exit_code": out.result.exit_code,
        "duration_ms": out.result.duration.as_millis() as u64,
        "summary": out.digest.summary,
        "action_items": out.digest.action_items,
        "token_estimate": out.digest.token_estimate,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /status/:session_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn status(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.sessions.status(&caller, &session_id).await?;
    Ok(Json(snapshot))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /close
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CloseBody {
    pub session_id: String,
}

/// Idempotent: closing an unknown or expired session reports
/// `closed: false` with 200.
pub async fn close(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Meta(meta): Meta,
    payload: Result<Json<CloseBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    let closed = state.sessions.close(&caller, &meta, &req.session_id).await;
    Ok(Json(serde_json::json!({
        "session_id": req.session_id,
        "closed": closed,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /sessions, GET /sessions/:session_id/messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_sessions(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> impl IntoResponse {
    let sessions: Vec<serde_json::Value> = state
        .sessions
        .list_for_client(&caller)
        .into_iter()
        .map(|e| {
            serde_json::json!({
                "session_id": e.session_id,
                "status": e.state,
                "created_at": e.created_at,
                "last_activity": e.last_activity,
                "expires_at": e.expires_at(),
            })
        })
        .collect();
    Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

pub async fn messages(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.sessions.messages(&caller, &session_id).await?;
    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "count": messages.len(),
        "messages": messages,
    })))
}
