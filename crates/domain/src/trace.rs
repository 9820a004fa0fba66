use serde::Serialize;

/// Structured trace events emitted across all CodeRelay crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionOpened {
        session_id: String,
        client_id: String,
    },
    SessionClosed {
        session_id: String,
        cancelled_run: bool,
    },
    SessionExpired {
        session_id: String,
        idle_secs: i64,
    },
    AgentRun {
        session_id: String,
        exit: String,
        exit_code: Option<i32>,
        duration_ms: u64,
        output_chars: usize,
    },
    TranscriptAppend {
        session_id: String,
        role: String,
        content_chars: usize,
    },
    TranscriptPurged {
        rows: usize,
        retention_days: u32,
    },
    AdmissionRejected {
        identity: String,
        endpoint: String,
        count: u32,
        limit: u32,
    },
    TokenIssued {
        client_id: String,
        scope: String,
        ttl_secs: i64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cr_event");
    }
}
