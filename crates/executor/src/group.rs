//! Process-group ownership for a running agent.

/// Kills the child's whole process group when dropped while armed.
///
/// The request future that owns a run can be dropped at any `.await` (client
/// disconnect, server shutdown). `kill_on_drop` only reaches the direct
/// child; this reaches whatever it spawned too.
pub struct ProcessGroupGuard {
    pgid: Option<i32>,
}

impl ProcessGroupGuard {
    /// `pid` is the child's PID, which is also its process-group ID because
    /// the child was spawned with `process_group(0)`.
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|p| i32::try_from(p).ok()).filter(|p| *p > 0),
        }
    }

    /// Kill the group now and disarm.
    pub fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }

    /// The child exited on its own; leave the group alone.
    pub fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: i32) {
    // SAFETY: killpg has no memory-safety preconditions; a stale or
    // already-dead group just yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
    } else {
        tracing::debug!(pgid, "agent process group killed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: i32) {}

/// Whether the gateway runs with an effective UID of 0.
#[cfg(unix)]
pub fn is_superuser() -> bool {
    // SAFETY: geteuid cannot fail and touches no memory.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_superuser() -> bool {
    false
}
