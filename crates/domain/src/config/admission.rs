use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admission control
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fixed-window request budget per (client address, endpoint).
///
/// Only `handshake` and `execute` are counted. `status` and `close` are
/// never throttled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Requests allowed per window. The request that pushes the count past
    /// this value is refused.
    #[serde(default = "d_5")]
    pub max_requests: u32,

    #[serde(default = "d_300")]
    pub window_secs: u64,

    /// How often stale buckets are swept.
    #[serde(default = "d_300")]
    pub sweep_interval_secs: u64,

    /// A bucket is evicted once its window ended more than this long ago.
    #[serde(default = "d_300")]
    pub retention_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_secs: 300,
            sweep_interval_secs: 300,
            retention_secs: 300,
        }
    }
}

fn d_5() -> u32 {
    5
}
fn d_300() -> u64 {
    300
}
