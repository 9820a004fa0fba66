//! Per-session cancellation tokens.
//!
//! Each in-flight run registers a [`CancellationToken`] under its session
//! ID. Closing the session (or shutting the gateway down) cancels the token
//! and the executor kills the agent's process group.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Tracks active cancellation tokens per session ID.
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a new cancel token for a session.
    pub fn register(&self, session_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .lock()
            .insert(session_id.to_owned(), token.clone());
        token
    }

    /// Cancel the running execution for a session. Returns true if a token
    /// was found.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.tokens.lock().get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every registered run. Used on shutdown.
    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens.lock();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Remove the token for a session (called when a run completes).
    pub fn remove(&self, session_id: &str) {
        self.tokens.lock().remove(session_id);
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.tokens.lock().contains_key(session_id)
    }
}

/// Unregisters the session's token when dropped, so an aborted request
/// future still cleans up after itself.
pub struct CancelRegistration {
    map: Arc<CancelMap>,
    session_id: String,
    token: CancellationToken,
}

impl CancelRegistration {
    pub fn new(map: Arc<CancelMap>, session_id: &str) -> Self {
        let token = map.register(session_id);
        Self {
            map,
            session_id: session_id.to_owned(),
            token,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        self.map.remove(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_map_register_and_cancel() {
        let map = CancelMap::new();
        let token = map.register("s1");
        assert!(!token.is_cancelled());
        assert!(map.is_running("s1"));

        assert!(map.cancel("s1"));
        assert!(token.is_cancelled());

        map.remove("s1");
        assert!(!map.is_running("s1"));
        assert!(!map.cancel("s1"));
    }

    #[test]
    fn cancel_nonexistent_session_returns_false() {
        let map = CancelMap::new();
        assert!(!map.cancel("does_not_exist"));
    }

    #[test]
    fn cancel_all_hits_every_token() {
        let map = CancelMap::new();
        let a = map.register("a");
        let b = map.register("b");
        assert_eq!(map.cancel_all(), 2);
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn registration_unregisters_on_drop() {
        let map = Arc::new(CancelMap::new());
        let reg = CancelRegistration::new(map.clone(), "s1");
        assert!(map.is_running("s1"));
        let token = reg.token().clone();
        drop(reg);
        assert!(!map.is_running("s1"));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn remove_is_idempotent() {
        let map = CancelMap::new();
        map.register("s1");
        map.remove("s1");
        map.remove("s1");
        assert!(!map.is_running("s1"));
    }
}
