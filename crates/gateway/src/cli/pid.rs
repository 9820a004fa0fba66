//! Optional PID file for running under a supervisor.
//!
//! The file is created (parents included), locked exclusively with `fs2`
//! and filled with our PID. A second instance pointed at the same file
//! fails to take the lock and refuses to start.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;

/// Write and lock the PID file. Keep the returned handle alive for as long
/// as the server runs; dropping it releases the lock.
pub fn write_pid_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .read(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("opening PID file {}: {e}", path.display()))?;

    file.try_lock_exclusive().map_err(|_| {
        anyhow::anyhow!(
            "another coderelay instance holds {}",
            path.display()
        )
    })?;

    let pid = std::process::id();
    writeln!(file, "{pid}")?;
    file.flush()?;

    tracing::info!(path = %path.display(), pid, "PID file written");
    Ok(file)
}

/// Delete the PID file, then release the lock by dropping `handle`.
pub fn remove_pid_file(path: &Path, handle: File) {
    match fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "PID file removed"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file"),
    }
    drop(handle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_writer_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("coderelay.pid");

        let handle = write_pid_file(&pid_path).unwrap();
        let stored: u32 = fs::read_to_string(&pid_path).unwrap().trim().parse().unwrap();
        assert_eq!(stored, std::process::id());

        assert!(write_pid_file(&pid_path).is_err());

        remove_pid_file(&pid_path, handle);
        assert!(!pid_path.exists());
    }

    #[test]
    fn creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("run").join("coderelay.pid");
        let handle = write_pid_file(&pid_path).unwrap();
        assert!(pid_path.exists());
        remove_pid_file(&pid_path, handle);
    }
}
