use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use cr_domain::config::Config;

use crate::audit::AuditLog;
use crate::credentials::TokenSigner;
use crate::runtime::admission::AdmissionController;
use crate::runtime::broker::SessionManager;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services**: config, session manager, admission control
/// - **Audit**: the bounded audit trail
/// - **Security**: credential signer and the admin token digest
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub admission: Arc<AdmissionController>,

    // ── Audit ─────────────────────────────────────────────────────────
    pub audit: Arc<AuditLog>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// Signs and verifies client/admin bearer credentials.
    pub tokens: Arc<TokenSigner>,
    /// SHA-256 hash of the static admin bearer token (read once at
    /// startup). `None` = only admin-scope credentials are accepted.
    pub admin_token_hash: Option<Vec<u8>>,

    // ── Process info ──────────────────────────────────────────────────
    pub started_at: DateTime<Utc>,
    pub config_path: PathBuf,
}
