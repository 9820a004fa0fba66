//! Per-session conversation history.
//!
//! [`TranscriptStore`] is synchronous; async callers go through
//! `spawn_blocking`. Messages are append-only and read back ordered by
//! timestamp, ties broken by insertion order.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use cr_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "agent" => Some(Role::Agent),
            _ => None,
        }
    }
}

/// A stored message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Insertion sequence assigned by the store. `0` from the no-op store.
    pub seq: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A message about to be appended.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NewMessage {
    pub fn user(session_id: &str, content: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_owned(),
            role: Role::User,
            content: content.to_owned(),
            summary: None,
            timestamp,
        }
    }

    pub fn agent(
        session_id: &str,
        content: &str,
        summary: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.to_owned(),
            role: Role::Agent,
            content: content.to_owned(),
            summary,
            timestamp,
        }
    }

    pub fn into_message(self, seq: i64) -> Message {
        Message {
            seq,
            session_id: self.session_id,
            role: self.role,
            content: self.content,
            summary: self.summary,
            timestamp: self.timestamp,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub trait TranscriptStore: Send + Sync {
    /// Short name for logs and stats (`"sqlite"`, `"null"`).
    fn kind(&self) -> &'static str;

    fn append(&self, msg: NewMessage) -> Result<Message>;

    /// All messages of a session, oldest first.
    fn list(&self, session_id: &str) -> Result<Vec<Message>>;

    /// The last `limit` messages of a session, oldest first.
    fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let mut all = self.list(session_id)?;
        let skip = all.len().saturating_sub(limit);
        Ok(all.split_off(skip))
    }

    /// Drop every message of a session. Returns the number removed.
    fn delete_all(&self, session_id: &str) -> Result<usize>;

    /// Drop messages strictly older than `cutoff`, across all sessions.
    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

// ── No-op store ─────────────────────────────────────────────────────

/// Used when persistence is disabled or the database failed to open.
/// Every operation succeeds and nothing is kept.
#[derive(Debug, Default)]
pub struct NullTranscriptStore;

impl TranscriptStore for NullTranscriptStore {
    fn kind(&self) -> &'static str {
        "null"
    }

    fn append(&self, msg: NewMessage) -> Result<Message> {
        Ok(msg.into_message(0))
    }

    fn list(&self, _session_id: &str) -> Result<Vec<Message>> {
        Ok(Vec::new())
    }

    fn delete_all(&self, _session_id: &str) -> Result<usize> {
        Ok(0)
    }

    fn purge_older_than(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SQLite store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transcript_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    summary TEXT,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transcript_session_ts
    ON transcript_messages (session_id, timestamp);
";

/// Fixed-width UTC timestamps so that string comparison in SQL matches
/// chronological order. Stored precision is microseconds.
fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Smallest stored timestamp not earlier than `ts`. A row is older than
/// `ts` exactly when it is older than this.
fn ceil_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let floor = ts.trunc_subsecs(6);
    if floor < ts {
        floor
            .checked_add_signed(chrono::Duration::microseconds(1))
            .unwrap_or(floor)
    } else {
        floor
    }
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad timestamp {raw:?}: {e}")))
}

fn storage(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

type RawRow = (i64, String, String, String, Option<String>, String);

fn decode_row(row: RawRow) -> Result<Message> {
    let (seq, session_id, role, content, summary, timestamp) = row;
    let role = Role::parse(&role)
        .ok_or_else(|| Error::Storage(format!("unknown role {role:?} in row {seq}")))?;
    Ok(Message {
        seq,
        session_id,
        role,
        content,
        summary,
        timestamp: decode_ts(&timestamp)?,
    })
}

pub struct SqliteTranscriptStore {
    conn: Mutex<Connection>,
}

impl SqliteTranscriptStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(storage)?;
        let store = Self::init(conn)?;
        tracing::info!(path = %path.display(), "transcript store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(storage)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Message>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(storage)?;
        let rows = stmt
            .query_map(params, |row| -> rusqlite::Result<RawRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .map_err(storage)?;

        let mut out = Vec::new();
        for row in rows {
            let raw: RawRow = row.map_err(storage)?;
            out.push(decode_row(raw)?);
        }
        Ok(out)
    }
}

impl TranscriptStore for SqliteTranscriptStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn append(&self, mut msg: NewMessage) -> Result<Message> {
        // Hand back exactly what a later read returns.
        msg.timestamp = msg.timestamp.trunc_subsecs(6);
        let seq = {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO transcript_messages (session_id, role, content, summary, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    msg.session_id,
                    msg.role.as_str(),
                    msg.content,
                    msg.summary,
                    encode_ts(&msg.timestamp),
                ],
            )
            .map_err(storage)?;
            conn.last_insert_rowid()
        };

        Ok(msg.into_message(seq))
    }

    fn list(&self, session_id: &str) -> Result<Vec<Message>> {
        self.query(
            "SELECT id, session_id, role, content, summary, timestamp
             FROM transcript_messages
             WHERE session_id = ?1
             ORDER BY timestamp ASC, id ASC",
            params![session_id],
        )
    }

    fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut out = self.query(
            "SELECT id, session_id, role, content, summary, timestamp
             FROM transcript_messages
             WHERE session_id = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
            params![session_id, limit],
        )?;
        out.reverse();
        Ok(out)
    }

    fn delete_all(&self, session_id: &str) -> Result<usize> {
        self.conn
            .lock()
            .execute(
                "DELETE FROM transcript_messages WHERE session_id = ?1",
                params![session_id],
            )
            .map_err(storage)
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.conn
            .lock()
            .execute(
                "DELETE FROM transcript_messages WHERE timestamp < ?1",
                params![encode_ts(&ceil_micros(cutoff))],
            )
            .map_err(storage)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn append_then_list_roundtrips_fields() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let t = base();
        store.append(NewMessage::user("s1", "fix it", t)).unwrap();
        let m = store
            .append(NewMessage::agent(
                "s1",
                "fixed",
                Some("fixed".into()),
                t + Duration::seconds(1),
            ))
            .unwrap();
        assert!(m.seq > 0);

        let msgs = store.list("s1").unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[0].content, "fix it");
        assert!(msgs[0].summary.is_none());
        assert_eq!(msgs[1].role, Role::Agent);
        assert_eq!(msgs[1].summary.as_deref(), Some("fixed"));
        assert_eq!(msgs[1].timestamp, t + Duration::seconds(1));
    }

    #[test]
    fn interleaved_appends_keep_per_session_order() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let t = base();
        let sessions = ["a", "b", "c"];

        // 120 appends, several sharing a timestamp, some arriving out of
        // timestamp order.
        for i in 0..120i64 {
            let sid = sessions[(i % 3) as usize];
            let ts = t + Duration::milliseconds((i / 6) * 10 + if i % 5 == 0 { -3 } else { 0 });
            store
                .append(NewMessage::user(sid, &format!("msg-{i}"), ts))
                .unwrap();
        }

        for sid in sessions {
            let msgs = store.list(sid).unwrap();
            assert_eq!(msgs.len(), 40);
            assert!(msgs.iter().all(|m| m.session_id == sid));
            for pair in msgs.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                assert!(
                    a.timestamp < b.timestamp || (a.timestamp == b.timestamp && a.seq < b.seq),
                    "out of order: {} ({}) then {} ({})",
                    a.content,
                    a.timestamp,
                    b.content,
                    b.timestamp,
                );
            }
        }
    }

    #[test]
    fn equal_timestamps_fall_back_to_insertion_order() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let t = base();
        for i in 0..5 {
            store.append(NewMessage::user("s", &i.to_string(), t)).unwrap();
        }
        let contents: Vec<String> =
            store.list("s").unwrap().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let t = base();
        for i in 0..8 {
            store
                .append(NewMessage::user("s", &i.to_string(), t + Duration::seconds(i)))
                .unwrap();
        }
        let tail: Vec<String> =
            store.recent("s", 3).unwrap().into_iter().map(|m| m.content).collect();
        assert_eq!(tail, vec!["5", "6", "7"]);
        assert_eq!(store.recent("s", 100).unwrap().len(), 8);
        assert!(store.recent("s", 0).unwrap().is_empty());
    }

    #[test]
    fn purge_is_strictly_older_than_cutoff() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let t = base();
        store.append(NewMessage::user("s", "old", t - Duration::seconds(1))).unwrap();
        store.append(NewMessage::user("s", "edge", t)).unwrap();
        store.append(NewMessage::user("s", "new", t + Duration::seconds(1))).unwrap();

        assert_eq!(store.purge_older_than(t).unwrap(), 1);
        let left: Vec<String> = store.list("s").unwrap().into_iter().map(|m| m.content).collect();
        assert_eq!(left, vec!["edge", "new"]);
    }

    #[test]
    fn sub_microsecond_timestamps_match_what_is_stored() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let t = base() + Duration::nanoseconds(1_500);

        let appended = store.append(NewMessage::user("s", "a", t)).unwrap();
        let listed = store.list("s").unwrap();
        assert_eq!(appended.timestamp, listed[0].timestamp);
        assert_eq!(appended.timestamp, base() + Duration::microseconds(1));
    }

    #[test]
    fn purge_cutoff_between_microseconds() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let t = base();
        store.append(NewMessage::user("s", "before", t + Duration::nanoseconds(100))).unwrap();
        store.append(NewMessage::user("s", "after", t + Duration::microseconds(1))).unwrap();

        // Stored as `t`, which is older than `t + 500ns`.
        assert_eq!(store.purge_older_than(t + Duration::nanoseconds(500)).unwrap(), 1);
        let left: Vec<String> = store.list("s").unwrap().into_iter().map(|m| m.content).collect();
        assert_eq!(left, vec!["after"]);
    }

    #[test]
    fn delete_all_only_touches_one_session() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let t = base();
        store.append(NewMessage::user("s1", "a", t)).unwrap();
        store.append(NewMessage::user("s1", "b", t)).unwrap();
        store.append(NewMessage::user("s2", "c", t)).unwrap();

        assert_eq!(store.delete_all("s1").unwrap(), 2);
        assert!(store.list("s1").unwrap().is_empty());
        assert_eq!(store.list("s2").unwrap().len(), 1);
        assert_eq!(store.delete_all("s1").unwrap(), 0);
    }

    #[test]
    fn operations_on_empty_store_are_noops() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        assert!(store.list("missing").unwrap().is_empty());
        assert_eq!(store.delete_all("missing").unwrap(), 0);
        assert_eq!(store.purge_older_than(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.db");
        {
            let store = SqliteTranscriptStore::open(&path).unwrap();
            store.append(NewMessage::user("s", "persisted", base())).unwrap();
        }
        let store = SqliteTranscriptStore::open(&path).unwrap();
        let msgs = store.list("s").unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "persisted");
    }

    #[test]
    fn null_store_keeps_nothing() {
        let store = NullTranscriptStore;
        let m = store.append(NewMessage::user("s", "hi", base())).unwrap();
        assert_eq!(m.seq, 0);
        assert_eq!(m.content, "hi");
        assert!(store.list("s").unwrap().is_empty());
        assert!(store.recent("s", 5).unwrap().is_empty());
        assert_eq!(store.delete_all("s").unwrap(), 0);
        assert_eq!(store.purge_older_than(base()).unwrap(), 0);
        assert_eq!(store.kind(), "null");
    }
}
