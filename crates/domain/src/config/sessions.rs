use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Inactivity timeout. A session is gone once `now - last_activity`
    /// reaches this value, whether or not the sweep has run yet.
    #[serde(default = "d_1800")]
    pub timeout_secs: u64,

    /// How often the background sweep evicts expired sessions.
    #[serde(default = "d_60")]
    pub sweep_interval_secs: u64,

    /// Number of trailing transcript messages included in a status reply.
    #[serde(default = "d_10")]
    pub status_recent_messages: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            sweep_interval_secs: 60,
            status_recent_messages: 10,
        }
    }
}

fn d_1800() -> u64 {
    1800
}
fn d_60() -> u64 {
    60
}
fn d_10() -> usize {
    10
}
