//! Session registry for running sync passes
//!
//! Tracks which accounts currently have a pass in flight within this
//! process, and hands out cancellation tokens. Registration follows
//! register-on-start / unregister-on-terminal-state: the guard returned
//! by [`SyncSessions::begin`] unregisters on drop, so no terminal path
//! can leak a session.
//!
//! This registry only coordinates within one process. Across instances,
//! the advisory in-progress flag in the store is the shared marker, and
//! engine mutations stay idempotent in case both lines of defense race.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation signal for a sync pass
///
/// Cancellation is checkpoint-safe: in-flight remote calls finish, no
/// further pages or batches start, and committed progress is retained.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the pass holding this token
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Process-wide registry of in-flight sync passes, keyed by account
#[derive(Debug, Default)]
pub struct SyncSessions {
    active: Mutex<HashMap<String, CancelToken>>,
}

impl SyncSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pass for an account.
    ///
    /// Returns None if a pass is already registered for that account.
    pub fn begin(&self, account_id: &str) -> Option<SessionGuard<'_>> {
        let mut active = self.active.lock().unwrap();
        if active.contains_key(account_id) {
            return None;
        }
        let token = CancelToken::new();
        active.insert(account_id.to_string(), token.clone());
        Some(SessionGuard {
            sessions: self,
            account_id: account_id.to_string(),
            token,
        })
    }

    /// Request cancellation of the pass for an account, if one is running
    pub fn cancel(&self, account_id: &str) -> bool {
        let active = self.active.lock().unwrap();
        match active.get(account_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Check whether a pass is registered for an account
    pub fn is_active(&self, account_id: &str) -> bool {
        self.active.lock().unwrap().contains_key(account_id)
    }

    fn end(&self, account_id: &str) {
        self.active.lock().unwrap().remove(account_id);
    }
}

/// Registration handle for one running pass; unregisters on drop
pub struct SessionGuard<'a> {
    sessions: &'a SyncSessions,
    account_id: String,
    token: CancelToken,
}

impl SessionGuard<'_> {
    /// The cancellation token for this pass
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.sessions.end(&self.account_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_blocks_second_session() {
        let sessions = SyncSessions::new();
        let guard = sessions.begin("acct").unwrap();
        assert!(sessions.begin("acct").is_none());
        assert!(sessions.is_active("acct"));

        drop(guard);
        assert!(!sessions.is_active("acct"));
        assert!(sessions.begin("acct").is_some());
    }

    #[test]
    fn test_accounts_are_independent() {
        let sessions = SyncSessions::new();
        let _a = sessions.begin("a").unwrap();
        let _b = sessions.begin("b").unwrap();
        assert!(sessions.is_active("a"));
        assert!(sessions.is_active("b"));
    }

    #[test]
    fn test_cancel_running_session() {
        let sessions = SyncSessions::new();
        let guard = sessions.begin("acct").unwrap();
        assert!(!guard.token().is_cancelled());

        assert!(sessions.cancel("acct"));
        assert!(guard.token().is_cancelled());
    }

    #[test]
    fn test_cancel_without_session() {
        let sessions = SyncSessions::new();
        assert!(!sessions.cancel("acct"));
    }
}
