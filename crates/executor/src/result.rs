use std::time::Duration;

use serde::Serialize;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitClass {
    Success,
    NonZeroExit,
    Timeout,
    LaunchError,
    /// Aborted by the caller (session closed, shutdown) before the deadline.
    Cancelled,
}

impl ExitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitClass::Success => "success",
            ExitClass::NonZeroExit => "non-zero-exit",
            ExitClass::Timeout => "timeout",
            ExitClass::LaunchError => "launch-error",
            ExitClass::Cancelled => "cancelled",
        }
    }
}

/// Outcome of a single agent run. Ephemeral: the gateway turns it into a
/// transcript message and a response body.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Captured stdout, trimmed. Partial output is kept on timeout.
    pub output: String,
    pub exit: ExitClass,
    /// Failure detail. `None` on success.
    pub error: Option<String>,
    /// `None` when the process never started or was killed by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.exit == ExitClass::Success
    }

    pub(crate) fn launch_error(message: String, duration: Duration) -> Self {
        Self {
            output: String::new(),
            exit: ExitClass::LaunchError,
            error: Some(message),
            exit_code: None,
            duration,
        }
    }
}
