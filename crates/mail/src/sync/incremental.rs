//! Incremental sync: apply one change-feed window on top of local state.
//!
//! Processing order matters: new content is fetched first, label deltas
//! are applied next, deletions last, and the cursor only advances after
//! every mutation in the window has been applied. A pass that fails or
//! is cancelled partway leaves the cursor untouched, so the same window
//! is replayed next time; every mutation is idempotent under replay.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::time::Instant;

use super::changes::partition_events;
use super::engine::{InProgressGuard, IncrementalSyncReport, SyncEngine};
use super::retry::with_backoff;
use super::sessions::CancelToken;
use crate::mailbox::is_cursor_expired;
use crate::models::{MessageId, MessageStub, SyncCursor};

impl SyncEngine {
    /// Run an incremental sync pass for an account from a stored cursor.
    ///
    /// When the remote reports the cursor expired, the stored token is
    /// cleared and the pass returns successfully with `cursor_reset`
    /// set; the next sync invocation falls through to a full sync.
    pub fn incremental_sync(
        &self,
        account_id: &str,
        cursor_token: &str,
        cancel: &CancelToken,
    ) -> Result<IncrementalSyncReport> {
        let started = Instant::now();
        let _flag = InProgressGuard::set(self.store.as_ref(), account_id)?;
        log::info!(
            "[SYNC] Starting incremental sync for {} from cursor {}",
            account_id,
            cursor_token
        );

        let mut report = IncrementalSyncReport::default();

        let page = match with_backoff(self.tuning.max_call_attempts, || {
            self.mailbox.changes_since(cursor_token)
        }) {
            Ok(page) => page,
            Err(err) if is_cursor_expired(&err) => {
                log::info!(
                    "[SYNC] Cursor {} expired for {}, next sync will be full",
                    cursor_token,
                    account_id
                );
                let cursor = match self.store.get_cursor(account_id)? {
                    Some(cursor) => cursor.invalidated(),
                    None => SyncCursor::new(account_id),
                };
                self.store.save_cursor(cursor)?;
                report.cursor_reset = true;
                report.duration_ms = started.elapsed().as_millis() as u64;
                return Ok(report);
            }
            Err(err) => return Err(err).context("Change feed fetch failed"),
        };

        report.events = page.events.len();
        let set = partition_events(page.events);

        if set.is_empty() {
            let cursor = self.advance_cursor(account_id, &page.new_token)?;
            report.new_cursor = Some(cursor);
            report.duration_ms = started.elapsed().as_millis() as u64;
            log::info!("[SYNC] No changes for {}", account_id);
            return Ok(report);
        }

        // Every added id keeps a stub even if its content fetch fails
        // below.
        let stubs: Vec<MessageStub> = set
            .added
            .iter()
            .map(|r| MessageStub::new(r.id.clone(), r.thread_id.clone(), account_id))
            .collect();
        if !stubs.is_empty() {
            self.store.insert_stubs(&stubs)?;
        }

        // Fetch content for ids we have no record of yet: additions, plus
        // label changes referencing messages from before our window.
        // Deleted ids are never fetched; delete wins.
        let label_changed = set.label_changed_ids();
        let mut candidate_ids: Vec<MessageId> =
            set.added.iter().map(|r| r.id.clone()).collect();
        let mut seen: HashSet<MessageId> = candidate_ids.iter().cloned().collect();
        for id in &label_changed {
            if !set.deleted.contains(id) && seen.insert(id.clone()) {
                candidate_ids.push(id.clone());
            }
        }
        let existing = self.store.existing_email_ids(account_id, &candidate_ids)?;
        let to_fetch: Vec<MessageId> = candidate_ids
            .into_iter()
            .filter(|id| !existing.contains(id))
            .collect();

        let fetched = self.fetch_and_store(account_id, &to_fetch, cancel)?;
        report.records_created = fetched.stored;
        report.fetch_batches = fetched.batches;
        report.fetch_errors = fetched.errors;

        if fetched.cancelled || cancel.is_cancelled() {
            // Leave the cursor where it was; the window replays next time.
            report.cancelled = true;
            report.duration_ms = started.elapsed().as_millis() as u64;
            log::info!("[SYNC] Incremental sync cancelled for {}", account_id);
            return Ok(report);
        }

        // Apply label deltas. Freshly fetched records already carry
        // current labels, so re-applying their deltas is a no-op.
        let empty: Vec<String> = Vec::new();
        for id in &label_changed {
            if set.deleted.contains(id) {
                continue;
            }
            let added = set.labels_added.get(id).unwrap_or(&empty);
            let removed = set.labels_removed.get(id).unwrap_or(&empty);
            if self.store.apply_label_delta(account_id, id, added, removed)? {
                report.label_updates += 1;
            }
        }

        // Deletions last; removing an id that is already gone is a no-op.
        for id in &set.deleted {
            self.store.delete_message(account_id, id)?;
            report.deleted += 1;
        }

        let cursor = self.advance_cursor(account_id, &page.new_token)?;
        report.new_cursor = Some(cursor);
        report.duration_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "[SYNC] Incremental sync complete for {}: +{} -{} ~{} in {}ms",
            account_id,
            report.records_created,
            report.deleted,
            report.label_updates,
            report.duration_ms
        );
        Ok(report)
    }

    /// Persist the advanced cursor after a fully applied window
    fn advance_cursor(&self, account_id: &str, token: &str) -> Result<String> {
        let cursor = match self.store.get_cursor(account_id)? {
            Some(cursor) => cursor.advanced(token),
            None => SyncCursor::at(account_id, token),
        };
        self.store.save_cursor(cursor)?;
        Ok(token.to_string())
    }
}
