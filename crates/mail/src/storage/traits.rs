//! Storage trait definitions

use anyhow::Result;
use std::collections::HashSet;

use crate::models::{EmailRecord, MessageId, MessageStub, SyncCursor};

/// Mail storage operations the sync engine depends on
///
/// Every mutation is an upsert, a create-if-absent, or an unconditional
/// delete, so re-running a partially completed sync pass never duplicates
/// rows or clobbers fields another writer changed in the meantime.
///
/// Implementations own the at-rest representation of sensitive fields
/// (subject, snippet, bodies); the engine only ever sees plaintext.
pub trait MailStore: Send + Sync {
    /// Insert stubs, skipping ids that already exist.
    /// Returns the number of rows actually created.
    fn insert_stubs(&self, stubs: &[MessageStub]) -> Result<usize>;

    /// Bulk existence lookup: which of these ids already have stubs?
    fn existing_message_ids(
        &self,
        account_id: &str,
        ids: &[MessageId],
    ) -> Result<HashSet<MessageId>>;

    /// Check if a stub exists for a message
    fn has_message(&self, account_id: &str, id: &MessageId) -> Result<bool>;

    /// Bulk existence lookup: which of these ids already have full email
    /// records (not just stubs)?
    fn existing_email_ids(
        &self,
        account_id: &str,
        ids: &[MessageId],
    ) -> Result<HashSet<MessageId>>;

    /// Count stubs for an account
    fn count_stubs(&self, account_id: &str) -> Result<usize>;

    /// Create a full email record unless one already exists.
    /// Returns true if a row was created.
    fn insert_email_if_absent(&self, record: EmailRecord) -> Result<bool>;

    /// Load a full email record
    fn get_email(&self, account_id: &str, id: &MessageId) -> Result<Option<EmailRecord>>;

    /// Apply a label delta to an existing record, re-deriving the
    /// read/starred flags. Returns false if no record exists for the id
    /// (stub-only messages have nothing to update).
    fn apply_label_delta(
        &self,
        account_id: &str,
        id: &MessageId,
        added: &[String],
        removed: &[String],
    ) -> Result<bool>;

    /// Delete the stub and email record for a message. Idempotent:
    /// deleting an id that was never stored succeeds.
    fn delete_message(&self, account_id: &str, id: &MessageId) -> Result<()>;

    /// Get the sync cursor for an account
    fn get_cursor(&self, account_id: &str) -> Result<Option<SyncCursor>>;

    /// Save the sync cursor (upsert)
    fn save_cursor(&self, cursor: SyncCursor) -> Result<()>;

    /// Flip the advisory in-progress marker, creating the cursor record
    /// lazily on an account's first sync attempt
    fn set_sync_in_progress(&self, account_id: &str, in_progress: bool) -> Result<()>;

    /// Remove all data for an account (stubs, emails, cursor)
    fn delete_account_data(&self, account_id: &str) -> Result<()>;
}
