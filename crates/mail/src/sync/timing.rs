//! Sync timing helpers

use chrono::{DateTime, Utc};

/// Check whether the cooldown since the last successful pass has elapsed.
/// A missing timestamp means the account has never synced.
pub fn cooldown_elapsed(last_sync_at: Option<DateTime<Utc>>, cooldown_secs: u64) -> bool {
    match last_sync_at {
        Some(last) => {
            let elapsed = Utc::now() - last;
            elapsed.num_seconds() >= cooldown_secs as i64
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_never_synced_is_due() {
        assert!(cooldown_elapsed(None, 300));
    }

    #[test]
    fn test_recent_sync_is_not_due() {
        let last = Utc::now() - Duration::seconds(10);
        assert!(!cooldown_elapsed(Some(last), 300));
    }

    #[test]
    fn test_stale_sync_is_due() {
        let last = Utc::now() - Duration::seconds(301);
        assert!(cooldown_elapsed(Some(last), 300));
    }

    #[test]
    fn test_zero_cooldown_is_always_due() {
        assert!(cooldown_elapsed(Some(Utc::now() - Duration::seconds(1)), 0));
    }
}
