use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cr_domain::config::ExecutorConfig;

use crate::group::{is_superuser, ProcessGroupGuard};
use crate::result::{ExecutionResult, ExitClass};

/// Flag that lets the agent act without interactive confirmation.
pub const SKIP_PERMISSIONS_FLAG: &str = "--dangerously-skip-permissions";

/// How long to wait for stdout/stderr to drain once the process group is
/// gone. Guards against a descendant that escaped the group holding a pipe.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runner seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-run knobs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Working directory for the agent. Must exist and be a directory.
    pub project_path: Option<PathBuf>,
    pub timeout: Duration,
}

/// Result of resolving the agent binary without running it.
#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub available: bool,
    pub binary: Option<PathBuf>,
    /// Names that were looked up, in order.
    pub candidates: Vec<String>,
}

/// Anything that can execute a prompt. The gateway holds one of these;
/// tests swap in a scripted double.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        prompt: &str,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> ExecutionResult;

    fn probe(&self) -> Availability;
}

/// Argument vector for one run.
pub fn build_args(prompt: &str, skip_permissions: bool) -> Vec<String> {
    let mut args = vec![
        "--print".to_string(),
        "--output-format".to_string(),
        "text".to_string(),
    ];
    if skip_permissions {
        args.push(SKIP_PERMISSIONS_FLAG.to_string());
    }
    args.push(prompt.to_string());
    args
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Subprocess launcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AgentLauncher {
    config: ExecutorConfig,
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

impl AgentLauncher {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Whether the skip-permissions flag will actually be passed.
    pub fn skips_permissions(&self) -> bool {
        self.config.skip_permissions && !is_superuser()
    }

    fn candidates(&self) -> Vec<String> {
        let mut names = vec![self.config.cli_path.clone()];
        if let Some(fallback) = self.config.fallback_path.as_ref().filter(|f| !f.is_empty()) {
            if *fallback != self.config.cli_path {
                names.push(fallback.clone());
            }
        }
        names
    }

    fn resolve_binary(&self) -> Option<PathBuf> {
        self.candidates()
            .iter()
            .find_map(|name| which::which(name).ok())
    }

    fn check_project_path(path: &Path) -> Result<(), String> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(format!("invalid project path {}: not a directory", path.display())),
            Err(e) => Err(format!("invalid project path {}: {e}", path.display())),
        }
    }
}

#[async_trait]
impl AgentRunner for AgentLauncher {
    fn probe(&self) -> Availability {
        let binary = self.resolve_binary();
        Availability {
            available: binary.is_some(),
            binary,
            candidates: self.candidates(),
        }
    }

    async fn run(
        &self,
        prompt: &str,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let started = Instant::now();

        let Some(binary) = self.resolve_binary() else {
            return ExecutionResult::launch_error(
                format!("agent CLI not found (tried {})", self.candidates().join(", ")),
                started.elapsed(),
            );
        };

        if let Some(dir) = &opts.project_path {
            if let Err(msg) = Self::check_project_path(dir) {
                return ExecutionResult::launch_error(msg, started.elapsed());
            }
        }

        let skip = self.skips_permissions();
        if self.config.skip_permissions && !skip {
            tracing::warn!("running as root: not passing {SKIP_PERMISSIONS_FLAG}");
        }

        let mut cmd = Command::new(&binary);
        cmd.args(build_args(prompt, skip))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &opts.project_path {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ExecutionResult::launch_error(
                    format!("failed to spawn {}: {e}", binary.display()),
                    started.elapsed(),
                );
            }
        };

        let mut guard = ProcessGroupGuard::new(child.id());
        let stdout_task = spawn_reader(child.stdout.take());
        let stderr_task = spawn_reader(child.stderr.take());

        tracing::debug!(
            binary = %binary.display(),
            pid = ?child.id(),
            timeout_secs = opts.timeout.as_secs(),
            "agent run started"
        );

        let deadline = tokio::time::sleep(opts.timeout);
        tokio::pin!(deadline);

        // Deadline first, then cancellation, then normal exit.
        let outcome = tokio::select! {
            biased;
            _ = &mut deadline => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
            status = child.wait() => Outcome::Exited(status),
        };

        match outcome {
            Outcome::Exited(_) => guard.disarm(),
            Outcome::TimedOut | Outcome::Cancelled => {
                guard.kill();
                let _ = child.kill().await;
            }
        }

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;
        let output = stdout.trim().to_string();
        let duration = started.elapsed();

        let result = match outcome {
            Outcome::TimedOut => ExecutionResult {
                output,
                exit: ExitClass::Timeout,
                error: Some(format!(
                    "execution timed out after {}s",
                    opts.timeout.as_secs_f64()
                )),
                exit_code: None,
                duration,
            },
            Outcome::Cancelled => ExecutionResult {
                output,
                exit: ExitClass::Cancelled,
                error: Some("execution cancelled".into()),
                exit_code: None,
                duration,
            },
            Outcome::Exited(Ok(status)) if status.success() => ExecutionResult {
                output,
                exit: ExitClass::Success,
                error: None,
                exit_code: status.code(),
                duration,
            },
            Outcome::Exited(Ok(status)) => {
                let stderr = stderr.trim();
                let error = if stderr.is_empty() {
                    status.to_string()
                } else {
                    stderr.to_string()
                };
                ExecutionResult {
                    output,
                    exit: ExitClass::NonZeroExit,
                    error: Some(error),
                    exit_code: status.code(),
                    duration,
                }
            }
            Outcome::Exited(Err(e)) => ExecutionResult {
                output,
                exit: ExitClass::LaunchError,
                error: Some(format!("waiting for agent: {e}")),
                exit_code: None,
                duration,
            },
        };

        tracing::debug!(
            exit = result.exit.as_str(),
            exit_code = ?result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            "agent run finished"
        );
        result
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn drain(task: JoinHandle<String>) -> String {
    match tokio::time::timeout(DRAIN_GRACE, task).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "output reader task failed");
            String::new()
        }
        Err(_) => {
            tracing::warn!("output pipe still open after the agent exited; dropping it");
            String::new()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
