//! Message stubs and id newtypes
//!
//! A stub is the minimal local record proving a remote message exists:
//! its id, its thread, and the owning account. A stub row is written for
//! every id the engine ever observes, whether or not full content was
//! fetched. Stubs are never updated after creation; they are only deleted
//! when the remote reports the message gone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (remote message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a thread (remote thread ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lightweight record of an observed remote message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStub {
    /// Remote message ID
    pub id: MessageId,
    /// Thread this message belongs to
    pub thread_id: ThreadId,
    /// Owning account
    pub account_id: String,
    /// When this stub was first observed locally
    pub first_seen_at: DateTime<Utc>,
}

impl MessageStub {
    /// Create a stub observed now
    pub fn new(
        id: impl Into<MessageId>,
        thread_id: impl Into<ThreadId>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            account_id: account_id.into(),
            first_seen_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_roundtrip() {
        let id = MessageId::new("m1");
        assert_eq!(id.as_str(), "m1");
        assert_eq!(MessageId::from("m1"), id);
    }

    #[test]
    fn test_stub_new() {
        let stub = MessageStub::new("m1", "t1", "acct");
        assert_eq!(stub.id.as_str(), "m1");
        assert_eq!(stub.thread_id.as_str(), "t1");
        assert_eq!(stub.account_id, "acct");
    }
}
