//! Health, availability and aggregate stats endpoints.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use chrono::Utc;

use crate::state::AppState;

use super::guard::AdminGuard;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /health — liveness probe (public, no auth, not budgeted)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /available — can an agent run right now? (public)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn available(State(state): State<AppState>) -> impl IntoResponse {
    let agent = state.sessions.runner().probe();
    Json(serde_json::json!({
        "available": agent.available,
        "agent": agent,
        "timestamp": Utc::now(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /admin/stats — aggregate counters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stats(State(state): State<AppState>, _guard: AdminGuard) -> impl IntoResponse {
    let rate = state.admission.stats();
    let uptime = Utc::now() - state.started_at;

    Json(serde_json::json!({
        "sessions": state.sessions.stats(),
        "audit": state.audit.stats(),
        "rate_limit": {
            "limit": rate.limit,
            "window_secs": rate.window_secs,
            "buckets": rate.buckets,
            "identities": rate.identities,
            "limited": rate.limited,
        },
        "tokens": {
            "revoked": state.tokens.revoked_count(),
        },
        "started_at": state.started_at,
        "uptime_secs": uptime.num_seconds(),
    }))
}
