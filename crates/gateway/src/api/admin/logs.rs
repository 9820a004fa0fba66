//! Audit log retrieval.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::audit::{AuditAction, AuditFilter};
use crate::state::AppState;

use super::guard::AdminGuard;

pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default = "d_page")]
    pub page: usize,
    #[serde(default = "d_limit")]
    pub limit: usize,
}

fn d_page() -> usize {
    1
}
fn d_limit() -> usize {
    50
}

/// `GET /admin/logs` — newest first, filtered and paginated.
pub async fn logs(
    State(state): State<AppState>,
    _guard: AdminGuard,
    Query(q): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let action = match q.action.as_deref().filter(|a| !a.is_empty()) {
        Some(raw) => Some(
            serde_json::from_value::<AuditAction>(serde_json::Value::String(raw.to_owned()))
                .map_err(|_| ApiError::bad_request(format!("unknown action: {raw}")))?,
        ),
        None => None,
    };
    let filter = AuditFilter {
        action,
        actor: q.actor,
        session_id: q.session_id,
        success: q.success,
        since: q.since,
        until: q.until,
    };
    let page = q.page.max(1);
    let limit = q.limit.clamp(1, MAX_PAGE_SIZE);

    let (entries, total) = state.audit.search(&filter, page, limit);
    Ok(Json(serde_json::json!({
        "entries": entries,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}
