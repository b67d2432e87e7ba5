//! Sync cursor tracking for incremental sync
//!
//! One cursor record per account. The token is the opaque point in the
//! remote change history the account has been synced up to; a null token
//! means the next pass must be a full sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracks sync progress for one account
///
/// The `in_progress` flag is an advisory mutual-exclusion marker, not a
/// lock: no atomic test-and-set is assumed against the store, so a race
/// can let two passes run. Every engine mutation stays idempotent to
/// tolerate that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Account identifier
    pub account_id: String,
    /// Opaque change-history token; None forces a full sync
    pub token: Option<String>,
    /// When the last successful pass completed
    pub last_sync_at: DateTime<Utc>,
    /// Advisory marker that a pass is currently running
    pub in_progress: bool,
}

impl SyncCursor {
    /// Create a fresh cursor with no token (next pass will be a full sync)
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            token: None,
            last_sync_at: Utc::now(),
            in_progress: false,
        }
    }

    /// Create a cursor positioned at a known token
    pub fn at(account_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            token: Some(token.into()),
            last_sync_at: Utc::now(),
            in_progress: false,
        }
    }

    /// Advance to a new token after a successful pass
    pub fn advanced(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self.last_sync_at = Utc::now();
        self.in_progress = false;
        self
    }

    /// Clear the token after the remote reported it expired.
    ///
    /// The next sync invocation falls through to a full sync.
    pub fn invalidated(mut self) -> Self {
        self.token = None;
        self.last_sync_at = Utc::now();
        self.in_progress = false;
        self
    }

    /// Check if this cursor is recent enough to be useful.
    /// Gmail history ids typically expire after about a week.
    pub fn is_recent(&self) -> bool {
        let age = Utc::now() - self.last_sync_at;
        age.num_days() < 7
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cursor_has_no_token() {
        let cursor = SyncCursor::new("acct");
        assert_eq!(cursor.account_id, "acct");
        assert!(cursor.token.is_none());
        assert!(!cursor.in_progress);
    }

    #[test]
    fn test_advanced() {
        let cursor = SyncCursor::at("acct", "100").advanced("105");
        assert_eq!(cursor.token.as_deref(), Some("105"));
        assert!(!cursor.in_progress);
    }

    #[test]
    fn test_invalidated_clears_token() {
        let cursor = SyncCursor::at("acct", "100").invalidated();
        assert!(cursor.token.is_none());
    }

    #[test]
    fn test_is_recent() {
        let cursor = SyncCursor::at("acct", "100");
        assert!(cursor.is_recent());

        let stale = SyncCursor {
            last_sync_at: Utc::now() - chrono::Duration::days(8),
            ..cursor
        };
        assert!(!stale.is_recent());
    }
}
