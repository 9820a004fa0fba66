//! Credential issuance, validation and revocation.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::api::error::{body, ApiError};
use crate::audit::{AuditAction, AuditEntry};
use crate::credentials::Scope;
use crate::state::AppState;

use super::guard::AdminGuard;

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub client_id: String,
    #[serde(default = "d_scope")]
    pub scope: Scope,
    /// Defaults to `auth.token_ttl_hours`.
    #[serde(default)]
    pub ttl_hours: Option<u32>,
}

fn d_scope() -> Scope {
    Scope::Client
}

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub token: String,
}

/// `POST /admin/tokens/generate`
pub async fn generate(
    State(state): State<AppState>,
    guard: AdminGuard,
    payload: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body(payload)?;
    let hours = body.ttl_hours.unwrap_or(state.config.auth.token_ttl_hours);
    let (token, claims) = state.tokens.issue(
        body.client_id.trim(),
        body.scope,
        chrono::Duration::hours(i64::from(hours)),
    )?;

    state.audit.record(
        AuditEntry::new(AuditAction::TokenIssue, &guard.actor, true).detail(format!(
            "{} scope={} ttl={hours}h jti={}",
            claims.sub,
            claims.scope.as_str(),
            claims.jti
        )),
    );

    Ok(Json(serde_json::json!({
        "token": token,
        "client_id": claims.sub,
        "scope": claims.scope,
        "expires_at": claims.expires_at(),
        "jti": claims.jti,
    })))
}

/// `POST /admin/tokens/validate`
pub async fn validate(
    State(state): State<AppState>,
    _guard: AdminGuard,
    payload: Result<Json<TokenBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body(payload)?;
    Ok(match state.tokens.verify(body.token.trim()) {
        Ok(claims) => Json(serde_json::json!({
            "valid": true,
            "client_id": claims.sub,
            "scope": claims.scope,
            "expires_at": claims.expires_at(),
            "jti": claims.jti,
        })),
        Err(e) => Json(serde_json::json!({
            "valid": false,
            "error": e.to_string(),
        })),
    })
}

/// `POST /admin/tokens/revoke`
pub async fn revoke(
    State(state): State<AppState>,
    guard: AdminGuard,
    payload: Result<Json<TokenBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body(payload)?;
    let claims = state.tokens.revoke(body.token.trim())?;

    state.audit.record(
        AuditEntry::new(AuditAction::TokenRevoke, &guard.actor, true)
            .detail(format!("{} jti={}", claims.sub, claims.jti)),
    );

    Ok(Json(serde_json::json!({
        "revoked": true,
        "client_id": claims.sub,
        "jti": claims.jti,
    })))
}
