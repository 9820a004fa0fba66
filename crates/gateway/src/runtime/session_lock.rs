//! Per-session execution lock.
//!
//! At most one agent run per session. A second execute arriving while a run
//! is in flight is rejected straight away rather than queued; runs on
//! different sessions never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Manages per-session run locks.
///
/// Each session ID maps to a `Semaphore(1)`. Holding the permit is holding
/// the session; it auto-releases on drop.
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Take the run lock for a session without waiting.
    pub fn try_acquire(&self, session_id: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().map_err(|_| SessionBusy)
    }

    /// Whether a run currently holds the session.
    pub fn is_busy(&self, session_id: &str) -> bool {
        self.locks
            .lock()
            .get(session_id)
            .is_some_and(|sem| sem.available_permits() == 0)
    }

    /// Number of sessions with a run in flight.
    pub fn busy_count(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|sem| sem.available_permits() == 0)
            .count()
    }

    /// Number of tracked sessions (for monitoring).
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Remove locks for sessions that aren't actively held (cleanup).
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// Returned when a run is already in flight for the session.
#[derive(Debug)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "an execution is already in progress for this session")
    }
}

impl std::error::Error for SessionBusy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_access() {
        let map = SessionLockMap::new();

        let permit1 = map.try_acquire("s1").unwrap();
        drop(permit1);

        let permit2 = map.try_acquire("s1").unwrap();
        drop(permit2);
    }

    #[test]
    fn same_session_is_rejected_while_held() {
        let map = SessionLockMap::new();
        let p1 = map.try_acquire("s1").unwrap();
        assert!(map.is_busy("s1"));
        assert!(map.try_acquire("s1").is_err());
        drop(p1);
        assert!(!map.is_busy("s1"));
        assert!(map.try_acquire("s1").is_ok());
    }

    #[test]
    fn different_sessions_concurrent() {
        let map = SessionLockMap::new();

        let p1 = map.try_acquire("s1").unwrap();
        let p2 = map.try_acquire("s2").unwrap();

        assert_eq!(map.session_count(), 2);
        assert_eq!(map.busy_count(), 2);

        drop(p1);
        drop(p2);
    }

    #[test]
    fn prune_keeps_held_locks() {
        let map = SessionLockMap::new();
        let held = map.try_acquire("s1").unwrap();
        drop(map.try_acquire("s2").unwrap());

        map.prune_idle();
        assert_eq!(map.session_count(), 1);
        assert!(map.try_acquire("s1").is_err());
        drop(held);
    }

    #[tokio::test]
    async fn permit_moves_across_tasks() {
        let map = Arc::new(SessionLockMap::new());
        let permit = map.try_acquire("s1").unwrap();

        let map2 = map.clone();
        let handle = tokio::spawn(async move {
            let busy = map2.is_busy("s1");
            drop(permit);
            busy
        });
        assert!(handle.await.unwrap());
        assert!(!map.is_busy("s1"));
    }
}
