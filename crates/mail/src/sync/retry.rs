//! Bounded retry with exponential backoff for remote calls
//!
//! This is the pass-level retry for transient failures (network blips,
//! 5xx). It composes on top of the credential refresh wrapper inside the
//! mailbox client: auth failures that survive a refresh, and expired
//! cursors, are terminal for the call and are never retried here.

use anyhow::Result;
use std::time::Duration;

use crate::mailbox::{is_auth_failed, is_cursor_expired};

/// Run an operation up to `max_attempts` times with exponential backoff
pub fn with_backoff<T>(max_attempts: u32, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let attempts = max_attempts.max(1);
    let mut delay = Duration::from_millis(100);
    let mut attempt = 0;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if !is_retryable(&err) || attempt >= attempts {
                    return Err(err);
                }
                log::debug!(
                    "[SYNC] Remote call failed (attempt {}/{}), backing off: {:#}",
                    attempt,
                    attempts,
                    err
                );
                std::thread::sleep(delay + Duration::from_millis(rand_jitter()));
                delay *= 2;
            }
        }
    }
}

/// Transient errors are retryable; unrepairable auth failures and
/// expired cursors are not.
fn is_retryable(err: &anyhow::Error) -> bool {
    !is_auth_failed(err) && !is_cursor_expired(err)
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{AuthFailedError, CursorExpiredError};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(3, || {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("connection reset")
            }
            Ok("ok")
        });
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("still down")
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_auth_failure_is_terminal() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AuthFailedError.into())
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cursor_expiry_is_terminal() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CursorExpiredError.into())
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
