//! Remote message normalization
//!
//! Converts the provider-agnostic [`RemoteMessage`] shape into an
//! [`EmailRecord`]. The MIME-part walk is a pure function from a body
//! part tree to `{text, html}` so it can be tested without any provider
//! client in the loop.

use chrono::{TimeZone, Utc};

use crate::mailbox::{BodyPart, Header, RemoteMessage};
use crate::models::{EmailAddress, EmailRecord};

/// Text and HTML bodies extracted from a part tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyContent {
    pub text: Option<String>,
    pub html: Option<String>,
}

/// Build an EmailRecord from a fetched remote message
pub fn normalize_message(account_id: &str, msg: &RemoteMessage) -> EmailRecord {
    let from = header_value(&msg.headers, "From")
        .map(|s| EmailAddress::parse(&s))
        .unwrap_or_else(|| EmailAddress::new("unknown@unknown.com"));

    let to = header_value(&msg.headers, "To")
        .map(|s| parse_address_list(&s))
        .unwrap_or_default();

    let subject = header_value(&msg.headers, "Subject").unwrap_or_default();

    let bodies = msg.body.as_ref().map(extract_bodies).unwrap_or_default();

    // Prefer the remote's snippet, fall back to the start of the text body
    let snippet = if msg.snippet.is_empty() {
        bodies
            .text
            .as_deref()
            .map(preview_of)
            .unwrap_or_default()
    } else {
        decode_html_entities(&msg.snippet)
    };

    let received_at = Utc
        .timestamp_millis_opt(msg.internal_date)
        .single()
        .unwrap_or_else(Utc::now);

    EmailRecord::builder(msg.id.clone(), msg.thread_id.clone())
        .account_id(account_id)
        .from(from)
        .to(to)
        .subject(subject)
        .snippet(snippet)
        .body_text(bodies.text)
        .body_html(bodies.html)
        .label_ids(msg.label_ids.iter().cloned())
        .internal_date(msg.internal_date)
        .received_at(received_at)
        .build()
}

/// Extract `{text, html}` from a body part tree.
///
/// Depth-first walk; the first text/plain and first text/html leaves win.
/// A leaf with data but no recognized MIME type is used as a last-resort
/// text body, matching how providers deliver simple single-part messages.
pub fn extract_bodies(root: &BodyPart) -> BodyContent {
    let mut content = BodyContent::default();
    walk(root, &mut content);

    if content.text.is_none()
        && content.html.is_none()
        && let Some(data) = &root.data
    {
        content.text = Some(data.clone());
    }

    content
}

fn walk(part: &BodyPart, content: &mut BodyContent) {
    if let Some(data) = &part.data {
        match part.mime_type.as_deref() {
            Some(m) if m.starts_with("text/plain") && content.text.is_none() => {
                content.text = Some(data.clone());
            }
            Some(m) if m.starts_with("text/html") && content.html.is_none() => {
                content.html = Some(data.clone());
            }
            _ => {}
        }
    }

    for nested in &part.parts {
        if content.text.is_some() && content.html.is_some() {
            return;
        }
        walk(nested, content);
    }
}

/// Find a header value by name, case-insensitively
pub fn header_value(headers: &[Header], name: &str) -> Option<String> {
    headers.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Parse a comma-separated list of email addresses
fn parse_address_list(s: &str) -> Vec<EmailAddress> {
    s.split(',')
        .map(|addr| EmailAddress::parse(addr.trim()))
        .collect()
}

/// First line of a body, truncated, for snippet fallback
fn preview_of(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    line.chars().take(120).collect()
}

/// Decode HTML entities in snippet text
fn decode_html_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageId, ThreadId};

    fn leaf(mime: &str, data: &str) -> BodyPart {
        BodyPart {
            mime_type: Some(mime.to_string()),
            data: Some(data.to_string()),
            parts: Vec::new(),
        }
    }

    #[test]
    fn test_extract_bodies_simple_text() {
        let root = leaf("text/plain", "hello");
        let bodies = extract_bodies(&root);
        assert_eq!(bodies.text.as_deref(), Some("hello"));
        assert!(bodies.html.is_none());
    }

    #[test]
    fn test_extract_bodies_multipart_alternative() {
        let root = BodyPart {
            mime_type: Some("multipart/alternative".to_string()),
            data: None,
            parts: vec![leaf("text/plain", "plain"), leaf("text/html", "<p>html</p>")],
        };
        let bodies = extract_bodies(&root);
        assert_eq!(bodies.text.as_deref(), Some("plain"));
        assert_eq!(bodies.html.as_deref(), Some("<p>html</p>"));
    }

    #[test]
    fn test_extract_bodies_nested_parts() {
        let root = BodyPart {
            mime_type: Some("multipart/mixed".to_string()),
            data: None,
            parts: vec![BodyPart {
                mime_type: Some("multipart/alternative".to_string()),
                data: None,
                parts: vec![leaf("text/html", "<b>deep</b>")],
            }],
        };
        let bodies = extract_bodies(&root);
        assert!(bodies.text.is_none());
        assert_eq!(bodies.html.as_deref(), Some("<b>deep</b>"));
    }

    #[test]
    fn test_extract_bodies_first_match_wins() {
        let root = BodyPart {
            mime_type: Some("multipart/mixed".to_string()),
            data: None,
            parts: vec![leaf("text/plain", "first"), leaf("text/plain", "second")],
        };
        assert_eq!(extract_bodies(&root).text.as_deref(), Some("first"));
    }

    #[test]
    fn test_extract_bodies_untyped_fallback() {
        let root = BodyPart {
            mime_type: None,
            data: Some("raw body".to_string()),
            parts: Vec::new(),
        };
        assert_eq!(extract_bodies(&root).text.as_deref(), Some("raw body"));
    }

    #[test]
    fn test_header_value_case_insensitive() {
        let headers = vec![Header {
            name: "FROM".to_string(),
            value: "a@example.com".to_string(),
        }];
        assert_eq!(
            header_value(&headers, "from"),
            Some("a@example.com".to_string())
        );
        assert_eq!(header_value(&headers, "Subject"), None);
    }

    #[test]
    fn test_normalize_message() {
        let msg = RemoteMessage {
            id: MessageId::new("m1"),
            thread_id: ThreadId::new("t1"),
            headers: vec![
                Header {
                    name: "From".to_string(),
                    value: "Alice <alice@example.com>".to_string(),
                },
                Header {
                    name: "To".to_string(),
                    value: "bob@example.com, Carol <carol@example.com>".to_string(),
                },
                Header {
                    name: "Subject".to_string(),
                    value: "Quarterly report".to_string(),
                },
            ],
            body: Some(leaf("text/plain", "See attached.")),
            label_ids: vec!["INBOX".to_string(), "UNREAD".to_string()],
            internal_date: 1_700_000_000_000,
            snippet: "See attached. &amp; more".to_string(),
        };

        let record = normalize_message("acct", &msg);
        assert_eq!(record.account_id, "acct");
        assert_eq!(record.from.email, "alice@example.com");
        assert_eq!(record.to.len(), 2);
        assert_eq!(record.subject, "Quarterly report");
        assert_eq!(record.snippet, "See attached. & more");
        assert_eq!(record.body_text.as_deref(), Some("See attached."));
        assert!(!record.is_read);
        assert_eq!(record.received_at.timestamp_millis(), 1_700_000_000_000);
    }
}
