//! AppState construction and background-task spawning extracted from `main.rs`.
//!
//! [`build_app_state`] is the shared boot path; [`spawn_background_tasks`]
//! starts the periodic sweeps once the server is about to listen.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use sha2::{Digest, Sha256};

use cr_domain::config::{Config, ConfigSeverity, TranscriptConfig};
use cr_domain::trace::TraceEvent;
use cr_executor::{AgentLauncher, AgentRunner};
use cr_sessions::{NullTranscriptStore, SqliteTranscriptStore, TranscriptStore};

use crate::audit::AuditLog;
use crate::credentials::TokenSigner;
use crate::runtime::admission::AdmissionController;
use crate::runtime::broker::{SessionManager, SessionManagerOptions};
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`]. Fails when the config has errors or the token secret is
/// missing.
pub fn build_app_state(config: Arc<Config>, config_path: String) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Credential signer (fatal if the secret is missing) ──────────
    let tokens = Arc::new(
        TokenSigner::from_env(&config.auth.secret_env).context("initializing credential signer")?,
    );
    tracing::info!(env = %config.auth.secret_env, "credential signer ready");

    let runner: Arc<dyn AgentRunner> = Arc::new(AgentLauncher::new(config.executor.clone()));
    let transcripts = open_transcript_store(&config.transcript);

    build_app_state_with(config, config_path, tokens, runner, transcripts)
}

/// Wire an [`AppState`] from already-built parts. Tests use this to swap
/// in a scripted agent runner and an in-memory store.
pub fn build_app_state_with(
    config: Arc<Config>,
    config_path: String,
    tokens: Arc<TokenSigner>,
    runner: Arc<dyn AgentRunner>,
    transcripts: Arc<dyn TranscriptStore>,
) -> anyhow::Result<AppState> {
    // ── Agent availability (diagnostic only) ─────────────────────────
    let probe = runner.probe();
    if probe.available {
        tracing::info!(binary = ?probe.binary, "agent binary found");
    } else {
        tracing::warn!(
            candidates = ?probe.candidates,
            "agent binary not found on PATH; executions will fail with launch-error"
        );
    }

    // ── Audit log ────────────────────────────────────────────────────
    let audit = Arc::new(AuditLog::new(config.audit.capacity));
    tracing::info!(capacity = config.audit.capacity, "audit log ready");

    // ── Session manager ──────────────────────────────────────────────
    let session_timeout = chrono::Duration::seconds(
        i64::try_from(config.sessions.timeout_secs).context("sessions.timeout_secs too large")?,
    );
    let sessions = Arc::new(SessionManager::new(
        SessionManagerOptions {
            session_timeout,
            run_timeout: Duration::from_secs(config.executor.timeout_secs),
            status_recent_messages: config.sessions.status_recent_messages,
        },
        runner,
        transcripts,
        audit.clone(),
    ));
    tracing::info!(
        timeout_secs = config.sessions.timeout_secs,
        "session manager ready"
    );

    // ── Admission control ────────────────────────────────────────────
    let admission = Arc::new(AdmissionController::new(&config.admission));
    tracing::info!(
        max_requests = config.admission.max_requests,
        window_secs = config.admission.window_secs,
        "admission control ready"
    );

    // ── Admin token (read once, hash for constant-time comparison) ──
    let admin_token_hash = {
        let env_var = &config.auth.admin_token_env;
        match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
            Some(t) => {
                tracing::info!(source = %format!("env:{env_var}"), "static admin token enabled");
                Some(Sha256::digest(t.as_bytes()).to_vec())
            }
            None => {
                tracing::info!(
                    "static admin token not set ({env_var}); admin surface accepts admin-scope credentials only"
                );
                None
            }
        }
    };

    Ok(AppState {
        config,
        sessions,
        admission,
        audit,
        tokens,
        admin_token_hash,
        started_at: Utc::now(),
        config_path: PathBuf::from(config_path),
    })
}

/// Open the durable transcript store, falling back to the no-op store when
/// persistence is disabled or the database cannot be opened.
pub fn open_transcript_store(config: &TranscriptConfig) -> Arc<dyn TranscriptStore> {
    if !config.enabled {
        tracing::info!("transcript persistence disabled");
        return Arc::new(NullTranscriptStore);
    }
    match SqliteTranscriptStore::open(&config.db_path) {
        Ok(store) => {
            tracing::info!(path = %config.db_path.display(), "transcript store ready");
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!(
                path = %config.db_path.display(),
                error = %e,
                "failed to open transcript store; continuing without persistence"
            );
            Arc::new(NullTranscriptStore)
        }
    }
}

/// Spawn the long-running background tokio tasks (session sweep, bucket
/// sweep, transcript retention, revocation pruning).
///
/// None of them hold a lock across I/O; each tick takes what it needs and
/// lets go.
pub fn spawn_background_tasks(state: &AppState) {
    let config = &state.config;

    // ── Expired-session sweep ────────────────────────────────────────
    {
        let sessions = state.sessions.clone();
        let period = Duration::from_secs(config.sessions.sweep_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let n = sessions.sweep().await;
                if n > 0 {
                    tracing::info!(evicted = n, "expired sessions swept");
                }
            }
        });
    }

    // ── Rate-bucket sweep + revocation pruning ───────────────────────
    {
        let admission = state.admission.clone();
        let tokens = state.tokens.clone();
        let period = Duration::from_secs(config.admission.sweep_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let buckets = admission.sweep();
                let revocations = tokens.prune_revoked(Utc::now());
                if buckets > 0 || revocations > 0 {
                    tracing::debug!(buckets, revocations, "stale admission state pruned");
                }
            }
        });
    }

    // ── Transcript retention ─────────────────────────────────────────
    if config.transcript.enabled && config.transcript.retention_days > 0 {
        let sessions = state.sessions.clone();
        let retention_days = config.transcript.retention_days;
        let period = Duration::from_secs(config.transcript.purge_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
                match sessions.purge_transcripts_before(cutoff).await {
                    Ok(0) => {}
                    Ok(rows) => TraceEvent::TranscriptPurged {
                        rows,
                        retention_days,
                    }
                    .emit(),
                    Err(e) => tracing::warn!(error = %e, "transcript retention purge failed"),
                }
            }
        });
    }

    tracing::info!("background tasks spawned");
}
