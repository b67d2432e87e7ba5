//! Gmail API HTTP client
//!
//! Implements the [`Mailbox`] contract over the Gmail REST API. Uses
//! synchronous HTTP (ureq) to be executor-agnostic. Every call goes
//! through the refresh-and-retry-once credential wrapper.

use anyhow::{Context, Result};
use base64::prelude::*;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

use super::api;
use crate::mailbox::{
    AuthFailedError, BodyPart, ChangeEvent, ChangePage, CursorExpiredError, Header, Mailbox,
    MessagePage, MessageRef, RemoteMessage, TokenProvider,
};
use crate::models::{MessageId, ThreadId};

/// Gmail API client
pub struct GmailClient {
    auth: Arc<dyn TokenProvider>,
    page_size: usize,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Maximum page size the listing and history endpoints accept
    const MAX_PAGE_SIZE: usize = 500;

    /// Maximum credential refreshes per logical call
    const MAX_REFRESH_ATTEMPTS: usize = 1;

    /// Create a new Gmail client with the default page size (500)
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            auth,
            page_size: Self::MAX_PAGE_SIZE,
        }
    }

    /// Override the listing/history page size (clamped to the API maximum)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, Self::MAX_PAGE_SIZE);
        self
    }

    /// Run a remote operation with the current access token.
    ///
    /// On an authorization failure the credential is refreshed and the
    /// operation retried, at most [`Self::MAX_REFRESH_ATTEMPTS`] times.
    /// A failure after that surfaces [`AuthFailedError`].
    fn with_reauth<T>(&self, op: impl Fn(&str) -> Result<T>) -> Result<T> {
        let mut token = self.auth.access_token()?;
        let mut refreshes = 0;

        loop {
            match op(&token) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !is_auth_error(&err) {
                        return Err(err);
                    }
                    if refreshes >= Self::MAX_REFRESH_ATTEMPTS {
                        return Err(err.context(AuthFailedError));
                    }
                    refreshes += 1;
                    log::info!("[GMAIL] Access token rejected, refreshing and retrying");
                    token = self
                        .auth
                        .refresh_access_token()
                        .map_err(|e| e.context("Credential refresh failed"))?;
                }
            }
        }
    }

    /// GET a JSON endpoint with auth handling
    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        self.with_reauth(|token| {
            let mut response = ureq::get(url.as_str())
                .header("Authorization", &format!("Bearer {}", token))
                .call()?;
            response
                .body_mut()
                .read_json()
                .with_context(|| format!("Failed to parse response from {}", url.path()))
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}/{}", Self::BASE_URL, path)).context("Invalid Gmail API URL")
    }

    /// Fetch one page of the history feed
    fn fetch_history_page(
        &self,
        start_token: &str,
        page_token: Option<&str>,
    ) -> Result<api::HistoryResponse> {
        let mut url = self.endpoint("users/me/history")?;
        url.query_pairs_mut()
            .append_pair("startHistoryId", start_token)
            .append_pair("maxResults", &self.page_size.to_string());
        if let Some(page) = page_token {
            url.query_pairs_mut().append_pair("pageToken", page);
        }
        for kind in ["messageAdded", "messageDeleted", "labelAdded", "labelRemoved"] {
            url.query_pairs_mut().append_pair("historyTypes", kind);
        }

        self.with_reauth(|access| {
            let result = ureq::get(url.as_str())
                .header("Authorization", &format!("Bearer {}", access))
                .call();
            match result {
                Ok(mut resp) => resp
                    .body_mut()
                    .read_json()
                    .context("Failed to parse history response"),
                // Gmail answers 404 when the start cursor fell out of the
                // retained history window.
                Err(ureq::Error::StatusCode(404)) => Err(CursorExpiredError.into()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

/// Fold one history page into the accumulated events and return the next
/// page token.
///
/// The response's `historyId` is the mailbox's current position, so it is
/// only adopted as the new cursor on the final page, once every earlier
/// page's records have been collected.
fn fold_history_page(
    response: api::HistoryResponse,
    events: &mut Vec<ChangeEvent>,
    new_token: &mut String,
) -> Option<String> {
    for record in response.history.unwrap_or_default() {
        collect_events(record, events);
    }
    if response.next_page_token.is_none()
        && let Some(id) = response.history_id
    {
        *new_token = id;
    }
    response.next_page_token
}

impl Mailbox for GmailClient {
    fn list_page(&self, page_token: Option<&str>) -> Result<MessagePage> {
        let mut url = self.endpoint("users/me/messages")?;
        url.query_pairs_mut()
            .append_pair("maxResults", &self.page_size.to_string());
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        let list: api::ListMessagesResponse = self
            .get_json(&url)
            .context("Failed to list mailbox messages")?;

        Ok(MessagePage {
            messages: list
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(convert_ref)
                .collect(),
            next_page_token: list.next_page_token,
        })
    }

    fn fetch_message(&self, id: &MessageId) -> Result<RemoteMessage> {
        let mut url = self.endpoint(&format!("users/me/messages/{}", id.as_str()))?;
        url.query_pairs_mut().append_pair("format", "full");

        let message: api::GmailMessage = self
            .get_json(&url)
            .with_context(|| format!("Failed to fetch message {}", id.as_str()))?;

        Ok(convert_message(message))
    }

    fn changes_since(&self, token: &str) -> Result<ChangePage> {
        // The history endpoint paginates past ~500 records. All pages
        // must be consumed before the cursor may move, otherwise deletions
        // in the unfetched tail are skipped over for good.
        let mut events = Vec::new();
        let mut new_token = token.to_string();
        let mut page_token: Option<String> = None;

        loop {
            let response = self.fetch_history_page(token, page_token.as_deref())?;
            match fold_history_page(response, &mut events, &mut new_token) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(ChangePage { events, new_token })
    }

    fn current_cursor(&self) -> Result<String> {
        let url = self.endpoint("users/me/profile")?;
        let profile: api::ProfileResponse = self
            .get_json(&url)
            .context("Failed to fetch mailbox profile")?;
        Ok(profile.history_id)
    }
}

/// Check whether an error chain looks like an authorization failure
fn is_auth_error(err: &anyhow::Error) -> bool {
    if let Some(ureq::Error::StatusCode(401)) = err.downcast_ref::<ureq::Error>() {
        return true;
    }
    let text = format!("{:#}", err).to_lowercase();
    text.contains("invalid_grant") || text.contains("unauthorized")
}

fn convert_ref(wire: api::MessageRef) -> MessageRef {
    let thread_id = wire.thread_id.unwrap_or_else(|| wire.id.clone());
    MessageRef {
        id: MessageId::new(wire.id),
        thread_id: ThreadId::new(thread_id),
    }
}

/// Flatten one history record into change events, preserving feed order
fn collect_events(record: api::HistoryRecord, events: &mut Vec<ChangeEvent>) {
    for added in record.messages_added.unwrap_or_default() {
        let r = convert_ref(added.message);
        events.push(ChangeEvent::Added {
            id: r.id,
            thread_id: r.thread_id,
        });
    }
    for deleted in record.messages_deleted.unwrap_or_default() {
        events.push(ChangeEvent::Deleted {
            id: MessageId::new(deleted.message.id),
        });
    }
    for change in record.labels_added.unwrap_or_default() {
        events.push(ChangeEvent::LabelsAdded {
            id: MessageId::new(change.message.id),
            labels: change.label_ids.unwrap_or_default(),
        });
    }
    for change in record.labels_removed.unwrap_or_default() {
        events.push(ChangeEvent::LabelsRemoved {
            id: MessageId::new(change.message.id),
            labels: change.label_ids.unwrap_or_default(),
        });
    }
}

/// Convert a Gmail wire message into the provider-agnostic shape,
/// decoding base64 body data into text along the way
fn convert_message(wire: api::GmailMessage) -> RemoteMessage {
    let internal_date: i64 = wire.internal_date.parse().unwrap_or(0);

    let (headers, body) = match wire.payload {
        Some(payload) => {
            let headers = payload
                .headers
                .unwrap_or_default()
                .into_iter()
                .map(|h| Header {
                    name: h.name,
                    value: h.value,
                })
                .collect();
            let body = BodyPart {
                mime_type: payload.mime_type,
                data: payload.body.and_then(|b| b.data).and_then(|d| decode_base64_body(&d)),
                parts: payload
                    .parts
                    .unwrap_or_default()
                    .into_iter()
                    .map(convert_part)
                    .collect(),
            };
            (headers, Some(body))
        }
        None => (Vec::new(), None),
    };

    RemoteMessage {
        id: MessageId::new(wire.id),
        thread_id: ThreadId::new(wire.thread_id),
        headers,
        body,
        label_ids: wire.label_ids.unwrap_or_default(),
        internal_date,
        snippet: wire.snippet,
    }
}

fn convert_part(wire: api::MessagePart) -> BodyPart {
    BodyPart {
        mime_type: wire.mime_type,
        data: wire.body.and_then(|b| b.data).and_then(|d| decode_base64_body(&d)),
        parts: wire
            .parts
            .unwrap_or_default()
            .into_iter()
            .map(convert_part)
            .collect(),
    }
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple
/// decoders.
fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(data) {
            if let Ok(s) = String::from_utf8(decoded) {
                return Some(s);
            }
        }
    }

    None
}
