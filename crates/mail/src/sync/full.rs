//! Full sync: enumerate the whole mailbox, persist stubs, backfill
//! recent content, and establish an incremental cursor.
//!
//! Every step is idempotent, so a pass that dies partway through can be
//! re-run without duplicating anything.

use anyhow::{Context, Result};
use std::time::Instant;

use super::engine::{FullSyncReport, InProgressGuard, SyncEngine};
use super::retry::with_backoff;
use super::sessions::CancelToken;
use crate::mailbox::MessageRef;
use crate::models::{MessageId, MessageStub, SyncCursor};

impl SyncEngine {
    /// Run a full sync pass for an account.
    ///
    /// Lists every message id page by page, persists lightweight stubs in
    /// batches, backfills full content for the most recent messages, and
    /// finishes by storing the provider's current cursor so the next pass
    /// can be incremental. Cancellation stops between pages and batches;
    /// progress already committed is kept, and the cursor is only stored
    /// when the pass ran to completion.
    pub fn full_sync(&self, account_id: &str, cancel: &CancelToken) -> Result<FullSyncReport> {
        let started = Instant::now();
        let _flag = InProgressGuard::set(self.store.as_ref(), account_id)?;
        log::info!("[SYNC] Starting full sync for {}", account_id);

        let mut report = FullSyncReport::default();

        // Enumerate all message ids. The listing is newest-first within
        // and across pages, so the accumulated order is already the
        // global recency order.
        let mut refs: Vec<MessageRef> = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let page = with_backoff(self.tuning.max_call_attempts, || {
                self.mailbox.list_page(page_token.as_deref())
            })
            .context("Mailbox listing failed, aborting full sync")?;

            refs.extend(page.messages);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        report.messages_listed = refs.len();
        log::info!(
            "[SYNC] Listed {} messages for {}",
            refs.len(),
            account_id
        );

        // Persist stubs in batches, skipping ids already present. Runs
        // even after cancellation so every id observed so far keeps a
        // stub.
        for chunk in refs.chunks(self.tuning.stub_batch_size.max(1)) {
            let ids: Vec<MessageId> = chunk.iter().map(|r| r.id.clone()).collect();
            let existing = self.store.existing_message_ids(account_id, &ids)?;
            let fresh: Vec<MessageStub> = chunk
                .iter()
                .filter(|r| !existing.contains(&r.id))
                .map(|r| MessageStub::new(r.id.clone(), r.thread_id.clone(), account_id))
                .collect();
            if !fresh.is_empty() {
                report.stubs_created += self.store.insert_stubs(&fresh)?;
            }
        }

        if report.cancelled {
            log::info!("[SYNC] Full sync cancelled for {}", account_id);
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        // Backfill full content for the most recent messages only; the
        // rest stay as stubs until something asks for them.
        let limit = refs.len().min(self.tuning.backfill_limit);
        let recent: Vec<MessageId> = refs[..limit].iter().map(|r| r.id.clone()).collect();
        let fetched = self.fetch_and_store(account_id, &recent, cancel)?;
        report.records_created = fetched.stored;
        report.fetch_batches = fetched.batches;
        report.fetch_errors = fetched.errors;

        if fetched.cancelled {
            report.cancelled = true;
            log::info!("[SYNC] Full sync cancelled for {}", account_id);
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        // Establish the cursor last, after the backfill, so the change
        // window cannot open a gap over messages this pass never saw.
        let token = with_backoff(self.tuning.max_call_attempts, || {
            self.mailbox.current_cursor()
        })
        .context("Failed to read current mailbox cursor")?;
        let cursor = match self.store.get_cursor(account_id)? {
            Some(cursor) => cursor.advanced(token.clone()),
            None => SyncCursor::at(account_id, token.clone()),
        };
        self.store.save_cursor(cursor)?;
        report.cursor = Some(token);

        report.duration_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "[SYNC] Full sync complete for {}: {} stubs, {} records, {} fetch errors in {}ms",
            account_id,
            report.stubs_created,
            report.records_created,
            report.fetch_errors,
            report.duration_ms
        );
        Ok(report)
    }
}
