//! In-memory session table.
//!
//! Every method takes `now` explicitly so expiry is decided by the caller's
//! clock and tests can move time freely. A session whose idle time has
//! reached its timeout is treated as absent even before the sweep removes
//! it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use cr_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle state. Sessions are either active or gone from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEntry {
    pub session_id: String,
    /// Identity of the credential that opened the session.
    pub client_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(skip)]
    pub timeout: Duration,
    pub state: SessionState,
}

impl SessionEntry {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.last_activity + self.timeout
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity < self.timeout
    }
}

/// Result of looking a session up by ID.
#[derive(Debug, Clone)]
pub enum Lookup {
    Live(SessionEntry),
    /// The session had expired and has now been removed from the table.
    /// The caller owns any cleanup (transcript purge, audit).
    Expired(SessionEntry),
    Missing,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionTable {
    timeout: Duration,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create a new active session owned by `client_id`.
    pub fn open(&self, client_id: &str, now: DateTime<Utc>) -> SessionEntry {
        let entry = SessionEntry {
            session_id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.to_owned(),
            created_at: now,
            last_activity: now,
            timeout: self.timeout,
            state: SessionState::Active,
        };
        self.sessions
            .write()
            .insert(entry.session_id.clone(), entry.clone());

        TraceEvent::SessionOpened {
            session_id: entry.session_id.clone(),
            client_id: entry.client_id.clone(),
        }
        .emit();

        entry
    }

    /// Look a session up, removing it on the spot if it has expired.
    ///
    /// A session with a run in flight (`is_busy`) is never expired here,
    /// matching [`take_expired`](Self::take_expired): it stays live until the
    /// run finishes and refreshes it.
    pub fn lookup<F>(&self, session_id: &str, now: DateTime<Utc>, is_busy: F) -> Lookup
    where
        F: Fn(&str) -> bool,
    {
        let live = |entry: &SessionEntry| entry.is_live(now) || is_busy(&entry.session_id);
        {
            let sessions = self.sessions.read();
            match sessions.get(session_id) {
                None => return Lookup::Missing,
                Some(entry) if live(entry) => return Lookup::Live(entry.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the write lock: another caller may have touched or
        // removed it in between.
        let mut sessions = self.sessions.write();
        match sessions.get(session_id) {
            None => Lookup::Missing,
            Some(entry) if live(entry) => Lookup::Live(entry.clone()),
            Some(_) => match sessions.remove(session_id) {
                Some(entry) => Lookup::Expired(entry),
                None => Lookup::Missing,
            },
        }
    }

    /// Live session or `None`. Expired entries are left for the sweep.
    pub fn get(&self, session_id: &str, now: DateTime<Utc>) -> Option<SessionEntry> {
        self.sessions
            .read()
            .get(session_id)
            .filter(|e| e.is_live(now))
            .cloned()
    }

    /// Refresh `last_activity`. Returns `false` if the session is gone.
    ///
    /// Callers only touch a session that is live or that they hold busy, so
    /// an entry past its deadline here is one kept alive by its run.
    pub fn touch(&self, session_id: &str, now: DateTime<Utc>) -> bool {
        match self.sessions.write().get_mut(session_id) {
            Some(entry) => {
                if now > entry.last_activity {
                    entry.last_activity = now;
                }
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions.write().remove(session_id)
    }

    /// Remove and return every expired session for which `is_busy` is
    /// false. Busy sessions stay until their run finishes.
    pub fn take_expired<F>(&self, now: DateTime<Utc>, is_busy: F) -> Vec<SessionEntry>
    where
        F: Fn(&str) -> bool,
    {
        let mut sessions = self.sessions.write();
        let expired: Vec<String> = sessions
            .values()
            .filter(|e| !e.is_live(now) && !is_busy(&e.session_id))
            .map(|e| e.session_id.clone())
            .collect();

        expired
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect()
    }

    /// Live sessions owned by `client_id`, oldest first. Busy sessions count
    /// as live, as in [`lookup`](Self::lookup).
    pub fn list_for_client<F>(
        &self,
        client_id: &str,
        now: DateTime<Utc>,
        is_busy: F,
    ) -> Vec<SessionEntry>
    where
        F: Fn(&str) -> bool,
    {
        let mut out: Vec<SessionEntry> = self
            .sessions
            .read()
            .values()
            .filter(|e| e.client_id == client_id && (e.is_live(now) || is_busy(&e.session_id)))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        out
    }

    /// Number of entries in the table, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
