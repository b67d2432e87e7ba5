//! Collaborator contracts for the sync engine
//!
//! The engine is parameterized by these traits rather than a concrete
//! provider SDK:
//! - [`Mailbox`]: paginated listing, full-content fetch, change feed, and
//!   the current change cursor of a remote mailbox.
//! - [`TokenProvider`]: supplies and refreshes the access credential used
//!   by a `Mailbox` implementation.
//!
//! The remote message shape is an explicit tagged structure (headers as a
//! key-value list, multipart body tree, label set, timestamps) instead of
//! a dynamic payload, so everything downstream of the provider client is
//! plain data.

use anyhow::Result;

use crate::models::{MessageId, ThreadId};

/// Error indicating the remote no longer recognizes a change cursor.
///
/// Not a failure: the engine clears the stored cursor and defers to a
/// future full sync. Detected via `downcast_ref` on `anyhow` chains.
#[derive(Debug, thiserror::Error)]
#[error("Change cursor expired or unknown to the remote mailbox")]
pub struct CursorExpiredError;

/// Error indicating authentication is beyond repair for this pass.
///
/// Raised after a credential refresh was attempted and the remote still
/// rejects the call. Callers map this to "please reconnect your account".
#[derive(Debug, thiserror::Error)]
#[error("Authentication failed; account must be reconnected")]
pub struct AuthFailedError;

/// Identity pair returned by the listing endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: MessageId,
    pub thread_id: ThreadId,
}

/// One page of the remote mailbox listing
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    /// Identity pairs, in the remote's own order (newest first for Gmail)
    pub messages: Vec<MessageRef>,
    /// Token for the next page; None when the listing is exhausted
    pub next_page_token: Option<String>,
}

/// Email header as a name-value pair
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Node in a message's multipart body tree
///
/// Leaf parts carry decoded text content; container parts carry children.
/// The provider client decodes transfer encodings before building this.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyPart {
    /// MIME type of this part (e.g. "text/plain", "multipart/alternative")
    pub mime_type: Option<String>,
    /// Decoded text content for leaf parts
    pub data: Option<String>,
    /// Nested parts for multipart containers
    pub parts: Vec<BodyPart>,
}

/// Full content of one remote message, provider-agnostic
#[derive(Debug, Clone)]
pub struct RemoteMessage {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub headers: Vec<Header>,
    /// Root of the body part tree, if the message had a payload
    pub body: Option<BodyPart>,
    pub label_ids: Vec<String>,
    /// Remote internal timestamp (milliseconds since epoch)
    pub internal_date: i64,
    /// Short preview supplied by the remote
    pub snippet: String,
}

/// One event from the remote change feed
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A message appeared in the mailbox
    Added { id: MessageId, thread_id: ThreadId },
    /// A message was removed from the mailbox
    Deleted { id: MessageId },
    /// Labels were added to an existing message
    LabelsAdded { id: MessageId, labels: Vec<String> },
    /// Labels were removed from an existing message
    LabelsRemoved { id: MessageId, labels: Vec<String> },
}

/// The remote change feed since a cursor
#[derive(Debug, Clone)]
pub struct ChangePage {
    /// Events since the requested cursor, in feed order
    pub events: Vec<ChangeEvent>,
    /// Cursor to persist once the events have been applied. Implementations
    /// must position this after every event in `events` and before none
    /// that were withheld.
    pub new_token: String,
}

/// Remote mailbox operations the sync engine depends on
///
/// Implementations own credential handling (including the refresh-and-
/// retry-once contract) and must surface [`CursorExpiredError`] when the
/// change feed rejects a starting cursor, and [`AuthFailedError`] when
/// authentication cannot be repaired by a refresh.
pub trait Mailbox: Send + Sync {
    /// Fetch one page of the mailbox listing
    fn list_page(&self, page_token: Option<&str>) -> Result<MessagePage>;

    /// Fetch full content for one message
    fn fetch_message(&self, id: &MessageId) -> Result<RemoteMessage>;

    /// Fetch all changes since the given cursor, draining any provider
    /// pagination internally
    fn changes_since(&self, token: &str) -> Result<ChangePage>;

    /// Fetch the mailbox's current change cursor (for a brand-new account)
    fn current_cursor(&self) -> Result<String>;
}

/// Access-credential supplier for a remote mailbox account
pub trait TokenProvider: Send + Sync {
    /// Return a usable access credential, loading a cached one if valid
    fn access_token(&self) -> Result<String>;

    /// Force a refresh using the refresh credential and persist the result
    fn refresh_access_token(&self) -> Result<String>;
}

/// Check whether an error chain contains an unrecoverable auth failure
pub fn is_auth_failed(err: &anyhow::Error) -> bool {
    err.downcast_ref::<AuthFailedError>().is_some()
}

/// Check whether an error chain signals cursor expiry
pub fn is_cursor_expired(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CursorExpiredError>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_errors_survive_anyhow_chains() {
        let err: anyhow::Error = CursorExpiredError.into();
        let err = err.context("fetching changes");
        assert!(is_cursor_expired(&err));
        assert!(!is_auth_failed(&err));

        let err: anyhow::Error = AuthFailedError.into();
        assert!(is_auth_failed(&err));
    }
}
