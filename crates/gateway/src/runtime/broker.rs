//! Session manager: the one place that ties sessions, the agent runner,
//! transcripts and the audit trail together.
//!
//! Locking discipline:
//! - the session table lock is only held for lookups and updates, never
//!   across an `.await`;
//! - the per-session run lock (a `Semaphore(1)` permit) is held for the
//!   whole run, so two executes on one session never overlap while
//!   executes on different sessions never wait for each other;
//! - transcript I/O goes through `spawn_blocking` and failures are logged,
//!   not surfaced, except on the explicit read endpoints.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cr_digest::Digest;
use cr_domain::error::{Error, Result};
use cr_domain::trace::TraceEvent;
use cr_executor::{AgentRunner, ExecutionResult, RunOptions};
use cr_sessions::{
    Lookup, Message, NewMessage, SessionEntry, SessionState, SessionTable, TranscriptStore,
};

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::credentials::Claims;
use crate::runtime::cancel::{CancelMap, CancelRegistration};
use crate::runtime::session_lock::SessionLockMap;

const SYSTEM_ACTOR: &str = "system";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Request-scoped details carried into audit entries.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub request_id: String,
    pub client_ip: String,
}

#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub session_id: String,
    pub prompt: String,
    pub project_path: Option<PathBuf>,
}

/// Everything one execute produced.
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub message: Message,
    pub result: ExecutionResult,
    pub digest: Digest,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub client_id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub busy: bool,
    pub recent_messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub active: usize,
    pub busy: usize,
    pub transcript_store: &'static str,
    pub session_timeout_secs: i64,
}

pub struct SessionManagerOptions {
    pub session_timeout: chrono::Duration,
    pub run_timeout: Duration,
    pub status_recent_messages: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionManager {
    table: SessionTable,
    locks: SessionLockMap,
    cancels: Arc<CancelMap>,
    transcripts: Arc<dyn TranscriptStore>,
    runner: Arc<dyn AgentRunner>,
    audit: Arc<AuditLog>,
    run_timeout: Duration,
    status_recent_messages: usize,
}

impl SessionManager {
    pub fn new(
        opts: SessionManagerOptions,
        runner: Arc<dyn AgentRunner>,
        transcripts: Arc<dyn TranscriptStore>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            table: SessionTable::new(opts.session_timeout),
            locks: SessionLockMap::new(),
            cancels: Arc::new(CancelMap::new()),
            transcripts,
            runner,
            audit,
            run_timeout: opts.run_timeout,
            status_recent_messages: opts.status_recent_messages,
        }
    }

    pub fn runner(&self) -> &Arc<dyn AgentRunner> {
        &self.runner
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Open a new session owned by the caller.
    pub fn open(&self, caller: &Claims, meta: &RequestMeta) -> SessionEntry {
        let entry = self.table.open(&caller.sub, Utc::now());
        self.audit.record(
            AuditEntry::new(AuditAction::Handshake, &caller.sub, true)
                .session(&entry.session_id)
                .request(&meta.request_id, &meta.client_ip),
        );
        entry
    }

    /// Run one prompt against the session's agent.
    pub async fn execute(
        &self,
        caller: &Claims,
        meta: &RequestMeta,
        req: ExecuteRequest,
    ) -> Result<ExecuteOutcome> {
        if req.prompt.trim().is_empty() {
            return Err(Error::BadRequest("prompt must not be empty".into()));
        }
        let session_id = req.session_id.as_str();
        self.live_session(caller, session_id).await?;

        let _permit = self
            .locks
            .try_acquire(session_id)
            .map_err(|_| Error::SessionBusy(session_id.to_owned()))?;
        // Starting a run is activity; from here the held permit keeps the
        // session live until the run is done.
        if !self.table.touch(session_id, Utc::now()) {
            return Err(Error::SessionNotFound(session_id.to_owned()));
        }
        let registration = CancelRegistration::new(self.cancels.clone(), session_id);

        self.append(NewMessage::user(session_id, &req.prompt, Utc::now()))
            .await;

        let opts = RunOptions {
            project_path: req.project_path.clone(),
            timeout: self.run_timeout,
        };
        let result = self
            .runner
            .run(&req.prompt, &opts, registration.token())
            .await;
        drop(registration);

        let digest = cr_digest::digest(&result.output);
        let agent_msg = NewMessage::agent(
            session_id,
            &result.output,
            Some(digest.summary.clone()),
            Utc::now(),
        );
        let message = match self.append(agent_msg.clone()).await {
            Some(stored) => stored,
            None => agent_msg.into_message(0),
        };

        if !self.table.touch(session_id, Utc::now()) {
            // Closed or swept while the run was in flight.
            self.purge_transcript(session_id).await;
        }

        let duration_ms = result.duration.as_millis() as u64;
        TraceEvent::AgentRun {
            session_id: session_id.to_owned(),
            exit: result.exit.as_str().into(),
            exit_code: result.exit_code,
            duration_ms,
            output_chars: result.output.chars().count(),
        }
        .emit();

        let detail = match &result.error {
            Some(err) => format!("{}: {err}", result.exit.as_str()),
            None => result.exit.as_str().to_owned(),
        };
        self.audit.record(
            AuditEntry::new(AuditAction::Execute, &caller.sub, result.is_success())
                .detail(detail)
                .session(session_id)
                .request(&meta.request_id, &meta.client_ip)
                .duration_ms(duration_ms),
        );

        Ok(ExecuteOutcome {
            message,
            result,
            digest,
        })
    }

    /// Read-only snapshot. Does not count as activity.
    pub async fn status(&self, caller: &Claims, session_id: &str) -> Result<SessionSnapshot> {
        let entry = self.live_session(caller, session_id).await?;
        let limit = self.status_recent_messages;
        let id = session_id.to_owned();
        let recent_messages = self
            .blocking(move |store| store.recent(&id, limit))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(session_id, error = %e, "transcript read failed");
                Vec::new()
            });

        Ok(SessionSnapshot {
            expires_at: entry.expires_at(),
            busy: self.locks.is_busy(session_id),
            session_id: entry.session_id,
            client_id: entry.client_id,
            state: entry.state,
            created_at: entry.created_at,
            last_activity: entry.last_activity,
            recent_messages,
        })
    }

    /// Close a session. Idempotent: returns whether a live session was
    /// actually closed.
    pub async fn close(&self, caller: &Claims, meta: &RequestMeta, session_id: &str) -> bool {
        let closed = match self
            .table
            .lookup(session_id, Utc::now(), |id| self.locks.is_busy(id))
        {
            Lookup::Live(entry) if Self::may_access(caller, &entry) => {
                self.table.remove(session_id);
                let cancelled_run = self.cancels.cancel(session_id);
                self.purge_transcript(session_id).await;
                TraceEvent::SessionClosed {
                    session_id: session_id.to_owned(),
                    cancelled_run,
                }
                .emit();
                true
            }
            Lookup::Live(_) | Lookup::Missing => false,
            Lookup::Expired(entry) => {
                self.expire(entry).await;
                false
            }
        };

        self.audit.record(
            AuditEntry::new(AuditAction::Close, &caller.sub, true)
                .detail(if closed { "closed" } else { "not open" })
                .session(session_id)
                .request(&meta.request_id, &meta.client_ip),
        );
        closed
    }

    /// Live sessions owned by the caller.
    pub fn list_for_client(&self, caller: &Claims) -> Vec<SessionEntry> {
        self.table
            .list_for_client(&caller.sub, Utc::now(), |id| self.locks.is_busy(id))
    }

    /// Full transcript of a live session.
    pub async fn messages(&self, caller: &Claims, session_id: &str) -> Result<Vec<Message>> {
        self.live_session(caller, session_id).await?;
        let id = session_id.to_owned();
        self.blocking(move |store| store.list(&id)).await
    }

    // ── Background work ─────────────────────────────────────────────

    /// Evict expired sessions that have no run in flight.
    pub async fn sweep(&self) -> usize {
        let expired = self
            .table
            .take_expired(Utc::now(), |id| self.locks.is_busy(id));
        let n = expired.len();
        for entry in expired {
            self.expire(entry).await;
        }
        self.locks.prune_idle();
        n
    }

    /// Delete transcript rows older than `cutoff`.
    pub async fn purge_transcripts_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.blocking(move |store| store.purge_older_than(cutoff))
            .await
    }

    /// Cancel every in-flight run. Used on shutdown.
    pub fn cancel_all(&self) -> usize {
        self.cancels.cancel_all()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            active: self.table.len(),
            busy: self.locks.busy_count(),
            transcript_store: self.transcripts.kind(),
            session_timeout_secs: self.table.timeout().num_seconds(),
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Sessions are private to the client that opened them; admins see all.
    fn may_access(caller: &Claims, entry: &SessionEntry) -> bool {
        caller.is_admin() || entry.client_id == caller.sub
    }

    async fn live_session(&self, caller: &Claims, session_id: &str) -> Result<SessionEntry> {
        match self
            .table
            .lookup(session_id, Utc::now(), |id| self.locks.is_busy(id))
        {
            Lookup::Live(entry) if Self::may_access(caller, &entry) => Ok(entry),
            Lookup::Expired(entry) => {
                self.expire(entry).await;
                Err(Error::SessionNotFound(session_id.to_owned()))
            }
            _ => Err(Error::SessionNotFound(session_id.to_owned())),
        }
    }

    /// Cleanup for a session already removed from the table after expiry.
    async fn expire(&self, entry: SessionEntry) {
        let idle_secs = (Utc::now() - entry.last_activity).num_seconds();
        self.purge_transcript(&entry.session_id).await;
        TraceEvent::SessionExpired {
            session_id: entry.session_id.clone(),
            idle_secs,
        }
        .emit();
        self.audit.record(
            AuditEntry::new(AuditAction::SessionExpired, SYSTEM_ACTOR, true)
                .detail(format!("owner {} idle {idle_secs}s", entry.client_id))
                .session(&entry.session_id),
        );
    }

    async fn append(&self, msg: NewMessage) -> Option<Message> {
        let session_id = msg.session_id.clone();
        let role = msg.role;
        let content_chars = msg.content.chars().count();
        match self.blocking(move |store| store.append(msg)).await {
            Ok(stored) => {
                TraceEvent::TranscriptAppend {
                    session_id,
                    role: role.as_str().into(),
                    content_chars,
                }
                .emit();
                Some(stored)
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "transcript append failed; message not persisted"
                );
                None
            }
        }
    }

    async fn purge_transcript(&self, session_id: &str) {
        let id = session_id.to_owned();
        if let Err(e) = self.blocking(move |store| store.delete_all(&id)).await {
            tracing::warn!(session_id, error = %e, "transcript purge failed");
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TranscriptStore) -> Result<T> + Send + 'static,
    {
        let store = self.transcripts.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| Error::Storage(format!("transcript task failed: {e}")))?
    }
}
