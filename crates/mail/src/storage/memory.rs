//! In-memory storage implementation
//!
//! Used for engine tests and as a stand-in where persistence is not
//! needed. HashMaps behind RwLocks, keyed by (account, message id).

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::MailStore;
use crate::models::{EmailRecord, MessageId, MessageStub, SyncCursor};

type Key = (String, String);

/// In-memory implementation of MailStore
pub struct InMemoryMailStore {
    stubs: RwLock<HashMap<Key, MessageStub>>,
    emails: RwLock<HashMap<Key, EmailRecord>>,
    cursors: RwLock<HashMap<String, SyncCursor>>,
}

impl InMemoryMailStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            stubs: RwLock::new(HashMap::new()),
            emails: RwLock::new(HashMap::new()),
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn key(account_id: &str, id: &MessageId) -> Key {
        (account_id.to_string(), id.as_str().to_string())
    }
}

impl Default for InMemoryMailStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MailStore for InMemoryMailStore {
    fn insert_stubs(&self, stubs: &[MessageStub]) -> Result<usize> {
        let mut map = self.stubs.write().unwrap();
        let mut inserted = 0;
        for stub in stubs {
            let key = Self::key(&stub.account_id, &stub.id);
            if !map.contains_key(&key) {
                map.insert(key, stub.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn existing_message_ids(
        &self,
        account_id: &str,
        ids: &[MessageId],
    ) -> Result<HashSet<MessageId>> {
        let map = self.stubs.read().unwrap();
        Ok(ids
            .iter()
            .filter(|id| map.contains_key(&Self::key(account_id, id)))
            .cloned()
            .collect())
    }

    fn has_message(&self, account_id: &str, id: &MessageId) -> Result<bool> {
        let map = self.stubs.read().unwrap();
        Ok(map.contains_key(&Self::key(account_id, id)))
    }

    fn existing_email_ids(
        &self,
        account_id: &str,
        ids: &[MessageId],
    ) -> Result<HashSet<MessageId>> {
        let map = self.emails.read().unwrap();
        Ok(ids
            .iter()
            .filter(|id| map.contains_key(&Self::key(account_id, id)))
            .cloned()
            .collect())
    }

    fn count_stubs(&self, account_id: &str) -> Result<usize> {
        let map = self.stubs.read().unwrap();
        Ok(map.keys().filter(|(acct, _)| acct == account_id).count())
    }

    fn insert_email_if_absent(&self, record: EmailRecord) -> Result<bool> {
        let mut map = self.emails.write().unwrap();
        let key = Self::key(&record.account_id, &record.id);
        if map.contains_key(&key) {
            return Ok(false);
        }
        map.insert(key, record);
        Ok(true)
    }

    fn get_email(&self, account_id: &str, id: &MessageId) -> Result<Option<EmailRecord>> {
        let map = self.emails.read().unwrap();
        Ok(map.get(&Self::key(account_id, id)).cloned())
    }

    fn apply_label_delta(
        &self,
        account_id: &str,
        id: &MessageId,
        added: &[String],
        removed: &[String],
    ) -> Result<bool> {
        let mut map = self.emails.write().unwrap();
        match map.get_mut(&Self::key(account_id, id)) {
            Some(record) => {
                record.apply_label_delta(added, removed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_message(&self, account_id: &str, id: &MessageId) -> Result<()> {
        let key = Self::key(account_id, id);
        self.stubs.write().unwrap().remove(&key);
        self.emails.write().unwrap().remove(&key);
        Ok(())
    }

    fn get_cursor(&self, account_id: &str) -> Result<Option<SyncCursor>> {
        let map = self.cursors.read().unwrap();
        Ok(map.get(account_id).cloned())
    }

    fn save_cursor(&self, cursor: SyncCursor) -> Result<()> {
        let mut map = self.cursors.write().unwrap();
        map.insert(cursor.account_id.clone(), cursor);
        Ok(())
    }

    fn set_sync_in_progress(&self, account_id: &str, in_progress: bool) -> Result<()> {
        let mut map = self.cursors.write().unwrap();
        map.entry(account_id.to_string())
            .or_insert_with(|| SyncCursor::new(account_id))
            .in_progress = in_progress;
        Ok(())
    }

    fn delete_account_data(&self, account_id: &str) -> Result<()> {
        self.stubs
            .write()
            .unwrap()
            .retain(|(acct, _), _| acct != account_id);
        self.emails
            .write()
            .unwrap()
            .retain(|(acct, _), _| acct != account_id);
        self.cursors.write().unwrap().remove(account_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThreadId;

    fn stub(id: &str) -> MessageStub {
        MessageStub::new(id, "t1", "acct")
    }

    fn email(id: &str, labels: &[&str]) -> EmailRecord {
        EmailRecord::builder(MessageId::new(id), ThreadId::new("t1"))
            .account_id("acct")
            .label_ids(labels.iter().map(|l| l.to_string()))
            .build()
    }

    #[test]
    fn test_insert_stubs_skips_duplicates() {
        let store = InMemoryMailStore::new();
        let stubs = vec![stub("m1"), stub("m2")];

        assert_eq!(store.insert_stubs(&stubs).unwrap(), 2);
        assert_eq!(store.insert_stubs(&stubs).unwrap(), 0);
        assert_eq!(store.count_stubs("acct").unwrap(), 2);
    }

    #[test]
    fn test_existing_message_ids() {
        let store = InMemoryMailStore::new();
        store.insert_stubs(&[stub("m1")]).unwrap();

        let ids = vec![MessageId::new("m1"), MessageId::new("m2")];
        let existing = store.existing_message_ids("acct", &ids).unwrap();
        assert!(existing.contains(&MessageId::new("m1")));
        assert!(!existing.contains(&MessageId::new("m2")));
    }

    #[test]
    fn test_insert_email_if_absent() {
        let store = InMemoryMailStore::new();
        assert!(store.insert_email_if_absent(email("m1", &["INBOX"])).unwrap());
        assert!(!store.insert_email_if_absent(email("m1", &[])).unwrap());

        // Original record untouched
        let record = store
            .get_email("acct", &MessageId::new("m1"))
            .unwrap()
            .unwrap();
        assert!(record.label_ids.contains("INBOX"));
    }

    #[test]
    fn test_apply_label_delta_missing_record() {
        let store = InMemoryMailStore::new();
        let applied = store
            .apply_label_delta("acct", &MessageId::new("nope"), &[], &[])
            .unwrap();
        assert!(!applied);
    }

    #[test]
    fn test_delete_message_idempotent() {
        let store = InMemoryMailStore::new();
        store.insert_stubs(&[stub("m1")]).unwrap();
        store.insert_email_if_absent(email("m1", &[])).unwrap();

        store.delete_message("acct", &MessageId::new("m1")).unwrap();
        store.delete_message("acct", &MessageId::new("m1")).unwrap();

        assert!(!store.has_message("acct", &MessageId::new("m1")).unwrap());
        assert!(store.get_email("acct", &MessageId::new("m1")).unwrap().is_none());
    }

    #[test]
    fn test_set_sync_in_progress_creates_cursor() {
        let store = InMemoryMailStore::new();
        assert!(store.get_cursor("acct").unwrap().is_none());

        store.set_sync_in_progress("acct", true).unwrap();
        let cursor = store.get_cursor("acct").unwrap().unwrap();
        assert!(cursor.in_progress);
        assert!(cursor.token.is_none());

        store.set_sync_in_progress("acct", false).unwrap();
        assert!(!store.get_cursor("acct").unwrap().unwrap().in_progress);
    }

    #[test]
    fn test_delete_account_data() {
        let store = InMemoryMailStore::new();
        store.insert_stubs(&[stub("m1")]).unwrap();
        store.save_cursor(SyncCursor::at("acct", "100")).unwrap();
        store.insert_stubs(&[MessageStub::new("m9", "t9", "other")]).unwrap();

        store.delete_account_data("acct").unwrap();
        assert_eq!(store.count_stubs("acct").unwrap(), 0);
        assert!(store.get_cursor("acct").unwrap().is_none());
        assert_eq!(store.count_stubs("other").unwrap(), 1);
    }
}
