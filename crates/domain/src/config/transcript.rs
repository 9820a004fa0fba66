use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript persistence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable conversation history.
///
/// When disabled, or when the database cannot be opened, the gateway keeps
/// running with a no-op store and transcripts are simply not kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,

    /// SQLite database file. Parent directories are created on open.
    #[serde(default = "d_db_path")]
    pub db_path: PathBuf,

    /// Messages older than this are purged by the retention loop.
    /// `0` keeps everything.
    #[serde(default = "d_7")]
    pub retention_days: u32,

    #[serde(default = "d_300")]
    pub purge_interval_secs: u64,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: d_db_path(),
            retention_days: 7,
            purge_interval_secs: 300,
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_db_path() -> PathBuf {
    PathBuf::from("./data/transcripts.db")
}
fn d_7() -> u32 {
    7
}
fn d_300() -> u64 {
    300
}
