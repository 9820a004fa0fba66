//! Admission-control introspection and reset.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::api::error::{body, ApiError};
use crate::audit::{AuditAction, AuditEntry};
use crate::state::AppState;

use super::guard::AdminGuard;

/// `GET /admin/ratelimit/stats`
pub async fn stats(State(state): State<AppState>, _guard: AdminGuard) -> impl IntoResponse {
    Json(state.admission.stats())
}

#[derive(Debug, Deserialize)]
pub struct ResetBody {
    /// Client address whose buckets to clear.
    #[serde(default)]
    pub identity: Option<String>,
    /// Clear every bucket.
    #[serde(default)]
    pub all: bool,
}

/// `POST /admin/ratelimit/reset`
pub async fn reset(
    State(state): State<AppState>,
    guard: AdminGuard,
    payload: Result<Json<ResetBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body(payload)?;
    let (cleared, target) = match (body.identity.as_deref().filter(|i| !i.is_empty()), body.all) {
        (Some(identity), _) => (state.admission.reset(identity), identity.to_owned()),
        (None, true) => (state.admission.reset_all(), "*".to_owned()),
        (None, false) => return Err(ApiError::bad_request("identity or all=true is required")),
    };

    state.audit.record(
        AuditEntry::new(AuditAction::RateLimitReset, &guard.actor, true)
            .detail(format!("{target}: {cleared} bucket(s) cleared")),
    );

    Ok(Json(serde_json::json!({
        "identity": target,
        "cleared": cleared,
    })))
}
