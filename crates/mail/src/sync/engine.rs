//! Sync engine core: collaborator wiring, pass outcomes, shared fetch logic

use anyhow::Result;
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;

use super::retry::with_backoff;
use super::sessions::{CancelToken, SyncSessions};
use super::timing::cooldown_elapsed;
use crate::config::SyncTuning;
use crate::enrich::{self, EnrichmentHook, NoopEnrichment};
use crate::mailbox::{Mailbox, RemoteMessage, is_auth_failed};
use crate::models::{MessageId, MessageStub};
use crate::normalize::normalize_message;
use crate::storage::MailStore;

/// Outcome of a full sync pass
#[derive(Debug, Default, Clone)]
pub struct FullSyncReport {
    /// Message ids enumerated from the remote listing
    pub messages_listed: usize,
    /// Stub rows actually created (existing ids skipped)
    pub stubs_created: usize,
    /// Email records created during backfill
    pub records_created: usize,
    /// Full-content fetch batches issued
    pub fetch_batches: usize,
    /// Individual fetches that failed and were skipped
    pub fetch_errors: usize,
    /// Whether the pass stopped early on a cancellation signal
    pub cancelled: bool,
    /// The freshly established cursor, if the pass ran to completion
    pub cursor: Option<String>,
    /// Duration of the pass
    pub duration_ms: u64,
}

/// Outcome of an incremental sync pass
#[derive(Debug, Default, Clone)]
pub struct IncrementalSyncReport {
    /// Events in the processed change-feed page
    pub events: usize,
    /// Email records created for newly observed ids
    pub records_created: usize,
    /// Messages deleted locally
    pub deleted: usize,
    /// Records whose labels were updated via deltas
    pub label_updates: usize,
    /// Full-content fetch batches issued
    pub fetch_batches: usize,
    /// Individual fetches that failed and were skipped
    pub fetch_errors: usize,
    /// The stored cursor was expired remotely and has been cleared;
    /// the next sync invocation will perform a full sync
    pub cursor_reset: bool,
    /// Whether the pass stopped early on a cancellation signal
    pub cancelled: bool,
    /// The advanced cursor, if the pass ran to completion
    pub new_cursor: Option<String>,
    /// Duration of the pass
    pub duration_ms: u64,
}

/// User-facing failure classification for a sync attempt
#[derive(Debug, Error)]
pub enum SyncFailure {
    /// The credential could not be refreshed; the account must be
    /// reconnected before sync can proceed
    #[error("authentication expired, please reconnect")]
    ReconnectRequired,
    /// A transient remote or storage failure; retrying later is expected
    /// to succeed
    #[error("sync temporarily unavailable, will retry: {0}")]
    TemporarilyUnavailable(String),
}

/// Result of a dispatched sync attempt for one account
#[derive(Debug)]
pub enum SyncOutcome {
    /// A full sync ran (no usable cursor was stored)
    Full(FullSyncReport),
    /// An incremental sync ran against the stored cursor
    Incremental(IncrementalSyncReport),
    /// Another pass was already registered for this account
    AlreadyRunning,
    /// The pass failed; the cursor was not advanced
    Failed(SyncFailure),
}

/// Orchestrates full and incremental synchronization for accounts.
///
/// Parameterized by the remote mailbox, the local store, and the
/// enrichment hook, so provider SDKs and persistence stay at the edges.
pub struct SyncEngine {
    pub(super) mailbox: Arc<dyn Mailbox>,
    pub(super) store: Arc<dyn MailStore>,
    pub(super) hook: Arc<dyn EnrichmentHook>,
    pub(super) sessions: Arc<SyncSessions>,
    pub(super) tuning: SyncTuning,
}

impl SyncEngine {
    /// Create an engine with default tuning and a no-op enrichment hook
    pub fn new(mailbox: Arc<dyn Mailbox>, store: Arc<dyn MailStore>) -> Self {
        Self {
            mailbox,
            store,
            hook: Arc::new(NoopEnrichment),
            sessions: Arc::new(SyncSessions::new()),
            tuning: SyncTuning::default(),
        }
    }

    /// Set the enrichment hook invoked per newly stored message
    pub fn with_hook(mut self, hook: Arc<dyn EnrichmentHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Share a session registry with other engine instances
    pub fn with_sessions(mut self, sessions: Arc<SyncSessions>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Override the sync tuning knobs
    pub fn with_tuning(mut self, tuning: SyncTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// The session registry, for callers that want to cancel passes
    pub fn sessions(&self) -> &Arc<SyncSessions> {
        &self.sessions
    }

    /// Run the appropriate sync pass for an account: incremental when a
    /// cursor is stored, full otherwise. Registers the pass in the
    /// session registry and classifies failures for callers.
    pub fn sync_account(&self, account_id: &str) -> SyncOutcome {
        let Some(session) = self.sessions.begin(account_id) else {
            log::debug!("[SYNC] Pass already running for {}", account_id);
            return SyncOutcome::AlreadyRunning;
        };

        let stored = match self.store.get_cursor(account_id) {
            Ok(cursor) => cursor,
            Err(e) => return SyncOutcome::Failed(classify_failure(&e)),
        };
        // A cursor past the provider's history retention window would be
        // rejected remotely anyway; skip straight to a full sync.
        let stored_token = match stored {
            Some(cursor) if cursor.token.is_some() && !cursor.is_recent() => {
                log::info!(
                    "[SYNC] Cursor for {} is older than the history window, running full sync",
                    account_id
                );
                None
            }
            Some(cursor) => cursor.token,
            None => None,
        };

        match stored_token {
            Some(token) => match self.incremental_sync(account_id, &token, session.token()) {
                Ok(report) => SyncOutcome::Incremental(report),
                Err(e) => SyncOutcome::Failed(classify_failure(&e)),
            },
            None => match self.full_sync(account_id, session.token()) {
                Ok(report) => SyncOutcome::Full(report),
                Err(e) => SyncOutcome::Failed(classify_failure(&e)),
            },
        }
    }

    /// Request cancellation of a running pass for an account
    pub fn cancel(&self, account_id: &str) -> bool {
        self.sessions.cancel(account_id)
    }

    /// Check whether enough time has passed since the account's last
    /// successful pass to warrant another one
    pub fn should_sync(&self, account_id: &str, cooldown_secs: u64) -> Result<bool> {
        let cursor = self.store.get_cursor(account_id)?;
        let last = cursor
            .as_ref()
            .filter(|c| c.token.is_some())
            .map(|c| c.last_sync_at);
        Ok(cooldown_elapsed(last, cooldown_secs))
    }

    /// Fetch full content for a set of ids in bounded concurrent batches
    /// and store each as an email record (skipping ids that already have
    /// one). A failing item is logged and skipped; the rest of its batch
    /// still settles. Unrepairable auth failures abort the whole pass.
    pub(super) fn fetch_and_store(
        &self,
        account_id: &str,
        ids: &[MessageId],
        cancel: &CancelToken,
    ) -> Result<FetchOutcome> {
        let mut outcome = FetchOutcome::default();
        let batch_size = self.tuning.fetch_batch_size.max(1);

        for chunk in ids.chunks(batch_size) {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            outcome.batches += 1;

            // Settle-all: every fetch in the batch completes (or fails)
            // independently before any result is processed.
            let results: Vec<(usize, Result<RemoteMessage>)> = chunk
                .par_iter()
                .enumerate()
                .map(|(i, id)| {
                    let result = with_backoff(self.tuning.max_call_attempts, || {
                        self.mailbox.fetch_message(id)
                    });
                    (i, result)
                })
                .collect();

            for (i, result) in results {
                match result {
                    Ok(remote) => {
                        self.store.insert_stubs(&[MessageStub::new(
                            remote.id.clone(),
                            remote.thread_id.clone(),
                            account_id,
                        )])?;
                        let record = normalize_message(account_id, &remote);
                        if self.store.insert_email_if_absent(record.clone())? {
                            outcome.stored += 1;
                            enrich::notify_stored(self.hook.as_ref(), &record);
                        }
                    }
                    Err(err) if is_auth_failed(&err) => return Err(err),
                    Err(err) => {
                        log::warn!(
                            "[SYNC] Failed to fetch message {}, leaving stub only: {:#}",
                            chunk[i].as_str(),
                            err
                        );
                        outcome.errors += 1;
                    }
                }
            }
        }

        Ok(outcome)
    }
}

/// Per-batch fetch results accumulated across a pass phase
#[derive(Debug, Default)]
pub(super) struct FetchOutcome {
    pub stored: usize,
    pub batches: usize,
    pub errors: usize,
    pub cancelled: bool,
}

/// Map an error chain to its user-facing failure classification
fn classify_failure(err: &anyhow::Error) -> SyncFailure {
    if is_auth_failed(err) {
        SyncFailure::ReconnectRequired
    } else {
        SyncFailure::TemporarilyUnavailable(format!("{:#}", err))
    }
}

/// RAII marker that keeps the advisory in-progress flag set for the
/// duration of a pass and clears it on every exit path, errors included
pub(super) struct InProgressGuard<'a> {
    store: &'a dyn MailStore,
    account_id: &'a str,
}

impl<'a> InProgressGuard<'a> {
    pub(super) fn set(store: &'a dyn MailStore, account_id: &'a str) -> Result<Self> {
        store.set_sync_in_progress(account_id, true)?;
        Ok(Self { store, account_id })
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.set_sync_in_progress(self.account_id, false) {
            log::warn!(
                "[SYNC] Failed to clear in-progress flag for {}: {:#}",
                self.account_id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::AuthFailedError;
    use crate::storage::InMemoryMailStore;

    #[test]
    fn test_classify_failure() {
        let auth: anyhow::Error = AuthFailedError.into();
        assert!(matches!(
            classify_failure(&auth),
            SyncFailure::ReconnectRequired
        ));

        let transient = anyhow::anyhow!("connection reset");
        assert!(matches!(
            classify_failure(&transient),
            SyncFailure::TemporarilyUnavailable(_)
        ));
    }

    #[test]
    fn test_in_progress_guard_clears_on_drop() {
        let store = InMemoryMailStore::new();
        {
            let _guard = InProgressGuard::set(&store, "acct").unwrap();
            assert!(store.get_cursor("acct").unwrap().unwrap().in_progress);
        }
        assert!(!store.get_cursor("acct").unwrap().unwrap().in_progress);
    }
}
