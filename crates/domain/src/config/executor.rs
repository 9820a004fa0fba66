use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the coding-agent CLI is located and launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Binary name or absolute path of the agent CLI.
    #[serde(default = "d_cli_path")]
    pub cli_path: String,

    /// Tried when `cli_path` does not resolve on `PATH`.
    #[serde(default = "d_fallback_path")]
    pub fallback_path: Option<String>,

    /// Hard deadline for a single run. The whole process group is killed
    /// when it fires.
    #[serde(default = "d_300")]
    pub timeout_secs: u64,

    /// Pass `--dangerously-skip-permissions`. Ignored when running as root.
    #[serde(default)]
    pub skip_permissions: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            cli_path: d_cli_path(),
            fallback_path: d_fallback_path(),
            timeout_secs: 300,
            skip_permissions: false,
        }
    }
}

fn d_cli_path() -> String {
    "claude".into()
}
fn d_fallback_path() -> Option<String> {
    Some("anthropic".into())
}
fn d_300() -> u64 {
    300
}
