//! Full email record model

use super::{MessageId, ThreadId};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Gmail-style label marking a message as unread
pub const UNREAD_LABEL: &str = "UNREAD";
/// Gmail-style label marking a message as starred
pub const STARRED_LABEL: &str = "STARRED";

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com")
    pub email: String,
}

impl EmailAddress {
    /// Create a new email address with just the email
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new email address with a display name
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parse an email address from a string like "John Doe <john@example.com>"
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim();
            let email = s[angle_start + 1..angle_end].trim();
            return Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                email: email.to_string(),
            };
        }

        Self {
            name: None,
            email: s.to_string(),
        }
    }

    /// Format the email address for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// Full content of a synced message
///
/// Created at most once per message id; subsequent sync passes skip
/// re-creation. The label set and the derived read/starred flags are the
/// only fields mutated after creation, driven by change-feed label events.
///
/// Sensitive fields (subject, snippet, bodies) are plaintext here; the
/// storage layer seals them before they hit disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Remote message ID (same as the message's stub)
    pub id: MessageId,
    /// Thread this message belongs to
    pub thread_id: ThreadId,
    /// Owning account
    pub account_id: String,
    /// Sender
    pub from: EmailAddress,
    /// Recipients (To field)
    pub to: Vec<EmailAddress>,
    /// Subject line
    pub subject: String,
    /// Short plain-text preview
    pub snippet: String,
    /// Plain text body, if one was present
    pub body_text: Option<String>,
    /// HTML body, if one was present
    pub body_html: Option<String>,
    /// Whether the message has been read
    pub is_read: bool,
    /// Whether the message is starred
    pub is_starred: bool,
    /// Label set (Gmail-style ids, may include synthetic category labels)
    pub label_ids: BTreeSet<String>,
    /// Remote internal timestamp (milliseconds since epoch)
    pub internal_date: i64,
    /// When the message was received
    pub received_at: DateTime<Utc>,
}

impl EmailRecord {
    /// Create a new record builder
    pub fn builder(id: MessageId, thread_id: ThreadId) -> EmailRecordBuilder {
        EmailRecordBuilder::new(id, thread_id)
    }

    /// Apply a label delta: union the additions, subtract the removals.
    ///
    /// Deltas rather than full replacement, so a partially re-applied
    /// change window or an interleaved writer never clobbers labels it
    /// did not touch. Read/starred flags are re-derived from the result.
    pub fn apply_label_delta(&mut self, added: &[String], removed: &[String]) {
        for label in added {
            self.label_ids.insert(label.clone());
        }
        for label in removed {
            self.label_ids.remove(label);
        }
        self.derive_flags();
    }

    /// Re-derive `is_read` and `is_starred` from the label set
    pub fn derive_flags(&mut self) {
        self.is_read = !self.label_ids.contains(UNREAD_LABEL);
        self.is_starred = self.label_ids.contains(STARRED_LABEL);
    }
}

/// Builder for creating EmailRecord instances
pub struct EmailRecordBuilder {
    id: MessageId,
    thread_id: ThreadId,
    account_id: String,
    from: Option<EmailAddress>,
    to: Vec<EmailAddress>,
    subject: String,
    snippet: String,
    body_text: Option<String>,
    body_html: Option<String>,
    label_ids: BTreeSet<String>,
    internal_date: i64,
    received_at: Option<DateTime<Utc>>,
}

impl EmailRecordBuilder {
    fn new(id: MessageId, thread_id: ThreadId) -> Self {
        Self {
            id,
            thread_id,
            account_id: String::new(),
            from: None,
            to: Vec::new(),
            subject: String::new(),
            snippet: String::new(),
            body_text: None,
            body_html: None,
            label_ids: BTreeSet::new(),
            internal_date: 0,
            received_at: None,
        }
    }

    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn from(mut self, from: EmailAddress) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: Vec<EmailAddress>) -> Self {
        self.to = to;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn body_text(mut self, body_text: Option<String>) -> Self {
        self.body_text = body_text;
        self
    }

    pub fn body_html(mut self, body_html: Option<String>) -> Self {
        self.body_html = body_html;
        self
    }

    pub fn label_ids(mut self, label_ids: impl IntoIterator<Item = String>) -> Self {
        self.label_ids = label_ids.into_iter().collect();
        self
    }

    pub fn internal_date(mut self, internal_date: i64) -> Self {
        self.internal_date = internal_date;
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn build(self) -> EmailRecord {
        let received_at = self.received_at.unwrap_or_else(|| {
            Utc.timestamp_millis_opt(self.internal_date)
                .single()
                .unwrap_or_else(Utc::now)
        });
        let mut record = EmailRecord {
            id: self.id,
            thread_id: self.thread_id,
            account_id: self.account_id,
            from: self
                .from
                .unwrap_or_else(|| EmailAddress::new("unknown@unknown.com")),
            to: self.to,
            subject: self.subject,
            snippet: self.snippet,
            body_text: self.body_text,
            body_html: self.body_html,
            is_read: true,
            is_starred: false,
            label_ids: self.label_ids,
            internal_date: self.internal_date,
            received_at,
        };
        record.derive_flags();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_labels(labels: &[&str]) -> EmailRecord {
        EmailRecord::builder(MessageId::new("m1"), ThreadId::new("t1"))
            .account_id("acct")
            .from(EmailAddress::new("a@example.com"))
            .subject("Hello")
            .label_ids(labels.iter().map(|l| l.to_string()))
            .build()
    }

    #[test]
    fn test_parse_email_with_name() {
        let addr = EmailAddress::parse("John Doe <john@example.com>");
        assert_eq!(addr.name, Some("John Doe".to_string()));
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_parse_email_without_name() {
        let addr = EmailAddress::parse("john@example.com");
        assert_eq!(addr.name, None);
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_display_with_name() {
        let addr = EmailAddress::with_name("John Doe", "john@example.com");
        assert_eq!(addr.display(), "John Doe <john@example.com>");
    }

    #[test]
    fn test_flags_derived_on_build() {
        let record = record_with_labels(&["INBOX", "UNREAD", "STARRED"]);
        assert!(!record.is_read);
        assert!(record.is_starred);

        let record = record_with_labels(&["INBOX"]);
        assert!(record.is_read);
        assert!(!record.is_starred);
    }

    #[test]
    fn test_apply_label_delta() {
        let mut record = record_with_labels(&["INBOX", "UNREAD"]);

        record.apply_label_delta(&["STARRED".to_string()], &[]);
        record.apply_label_delta(&[], &["UNREAD".to_string()]);

        let labels: Vec<&str> = record.label_ids.iter().map(String::as_str).collect();
        assert_eq!(labels, vec!["INBOX", "STARRED"]);
        assert!(record.is_read);
        assert!(record.is_starred);
    }

    #[test]
    fn test_apply_label_delta_idempotent() {
        let mut record = record_with_labels(&["INBOX"]);
        record.apply_label_delta(&["STARRED".to_string()], &[]);
        record.apply_label_delta(&["STARRED".to_string()], &[]);
        assert_eq!(record.label_ids.len(), 2);
    }
}
