//! Bounded audit trail of session-affecting and administrative actions.
//!
//! The log is a ring buffer: once `capacity` entries are held, recording a
//! new one evicts the oldest. Every entry is mirrored to `tracing` so it
//! also lands in the structured log stream.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Handshake,
    Execute,
    Close,
    SessionExpired,
    RateLimited,
    RateLimitReset,
    TokenIssue,
    TokenRevoke,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Handshake => "handshake",
            AuditAction::Execute => "execute",
            AuditAction::Close => "close",
            AuditAction::SessionExpired => "session_expired",
            AuditAction::RateLimited => "rate_limited",
            AuditAction::RateLimitReset => "rate_limit_reset",
            AuditAction::TokenIssue => "token_issue",
            AuditAction::TokenRevoke => "token_revoke",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// Client identity, or `"system"` for background actions.
    pub actor: String,
    pub success: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, actor: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            actor: actor.into(),
            success,
            detail: String::new(),
            session_id: None,
            request_id: None,
            client_ip: None,
            duration_ms: None,
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn request(mut self, request_id: &str, client_ip: &str) -> Self {
        self.request_id = Some(request_id.to_owned());
        self.client_ip = Some(client_ip.to_owned());
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }
}

/// Optional filters for [`AuditLog::search`]. Unset fields match anything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub actor: Option<String>,
    pub session_id: Option<String>,
    pub success: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    fn matches(&self, e: &AuditEntry) -> bool {
        self.action.map_or(true, |a| a == e.action)
            && self.actor.as_deref().map_or(true, |a| a == e.actor)
            && self
                .session_id
                .as_deref()
                .map_or(true, |s| e.session_id.as_deref() == Some(s))
            && self.success.map_or(true, |s| s == e.success)
            && self.since.map_or(true, |t| e.timestamp >= t)
            && self.until.map_or(true, |t| e.timestamp <= t)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    pub total: usize,
    pub capacity: usize,
    pub failures: usize,
    pub by_action: BTreeMap<&'static str, usize>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ring buffer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AuditLog {
    inner: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn record(&self, entry: AuditEntry) {
        if entry.success {
            tracing::info!(
                target: "audit",
                action = entry.action.as_str(),
                actor = %entry.actor,
                session_id = ?entry.session_id,
                client_ip = ?entry.client_ip,
                detail = %entry.detail,
                "audit"
            );
        } else {
            tracing::warn!(
                target: "audit",
                action = entry.action.as_str(),
                actor = %entry.actor,
                session_id = ?entry.session_id,
                client_ip = ?entry.client_ip,
                detail = %entry.detail,
                "audit (failed)"
            );
        }

        let mut buf = self.inner.lock();
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(entry);
    }

    /// The `limit` most recent entries, newest first.
    pub fn query(&self, limit: usize) -> Vec<AuditEntry> {
        self.inner.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Filtered, paginated view (newest first). `page` is 1-based.
    /// Returns the page and the total number of matching entries.
    pub fn search(
        &self,
        filter: &AuditFilter,
        page: usize,
        limit: usize,
    ) -> (Vec<AuditEntry>, usize) {
        let buf = self.inner.lock();
        let matching: Vec<&AuditEntry> = buf.iter().rev().filter(|e| filter.matches(e)).collect();
        let total = matching.len();
        let skip = page.saturating_sub(1).saturating_mul(limit);
        let page = matching.into_iter().skip(skip).take(limit).cloned().collect();
        (page, total)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn stats(&self) -> AuditStats {
        let buf = self.inner.lock();
        let mut by_action = BTreeMap::new();
        let mut failures = 0;
        for e in buf.iter() {
            *by_action.entry(e.action.as_str()).or_insert(0) += 1;
            if !e.success {
                failures += 1;
            }
        }
        AuditStats {
            total: buf.len(),
            capacity: self.capacity,
            failures,
            by_action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(i: usize) -> AuditEntry {
        AuditEntry::new(AuditAction::Execute, format!("client-{i}"), true).detail(i.to_string())
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let log = AuditLog::new(3);
        for i in 0..5 {
            log.record(entry(i));
        }
        let recent = log.query(10);
        assert_eq!(recent.len(), 3);
        let details: Vec<&str> = recent.iter().map(|e| e.detail.as_str()).collect();
        assert_eq!(details, vec!["4", "3", "2"]);
    }

    #[test]
    fn query_respects_limit() {
        let log = AuditLog::new(100);
        for i in 0..50 {
            log.record(entry(i));
        }
        let recent = log.query(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].detail, "49");
        assert_eq!(recent[4].detail, "45");
    }

    #[test]
    fn empty_log() {
        let log = AuditLog::new(10);
        assert!(log.query(5).is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn search_filters_and_paginates() {
        let log = AuditLog::new(100);
        for i in 0..10 {
            log.record(
                AuditEntry::new(AuditAction::Handshake, "alice", true).detail(i.to_string()),
            );
            log.record(AuditEntry::new(AuditAction::Execute, "bob", i % 2 == 0).session("s1"));
        }

        let f = AuditFilter {
            action: Some(AuditAction::Handshake),
            ..Default::default()
        };
        let (page1, total) = log.search(&f, 1, 4);
        assert_eq!(total, 10);
        assert_eq!(page1.len(), 4);
        assert_eq!(page1[0].detail, "9");
        let (page3, _) = log.search(&f, 3, 4);
        assert_eq!(page3.len(), 2);
        assert_eq!(page3[1].detail, "0");

        let f = AuditFilter {
            actor: Some("bob".into()),
            success: Some(false),
            session_id: Some("s1".into()),
            ..Default::default()
        };
        assert_eq!(log.search(&f, 1, 100).1, 5);
    }

    #[test]
    fn stats_count_by_action() {
        let log = AuditLog::new(10);
        log.record(AuditEntry::new(AuditAction::Handshake, "a", true));
        log.record(AuditEntry::new(AuditAction::Execute, "a", false));
        log.record(AuditEntry::new(AuditAction::Execute, "a", true));
        let s = log.stats();
        assert_eq!(s.total, 3);
        assert_eq!(s.failures, 1);
        assert_eq!(s.by_action["execute"], 2);
        assert_eq!(s.by_action["handshake"], 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let log = AuditLog::new(0);
        log.record(entry(1));
        log.record(entry(2));
        assert_eq!(log.len(), 1);
    }
}
