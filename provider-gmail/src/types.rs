//! Gmail API response types
//!
//! Data structures for deserializing Gmail API v1 responses, plus the
//! summary shape handed to collaborators.

use serde::{Deserialize, Serialize};

/// Headers kept in a [`ResourceSummary`], in the order they are requested.
pub const SUMMARY_HEADERS: [&str; 3] = ["From", "Subject", "Date"];

/// A single message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// Compact view of one message.
///
/// `headers` only carries From / Subject / Date, and only the ones the
/// message actually has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub id: String,
    pub snippet: String,
    pub headers: Vec<MessageHeader>,
}

impl ResourceSummary {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// Gmail API users.messages.list response
///
/// See: https://developers.google.com/gmail/api/reference/rest/v1/users.messages/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListResponse {
    /// Absent when the mailbox is empty
    #[serde(default)]
    pub messages: Vec<MessageRef>,

    #[serde(default)]
    pub next_page_token: Option<String>,

    #[serde(default)]
    pub result_size_estimate: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Gmail API message resource in `format=metadata`
///
/// See: https://developers.google.com/gmail/api/reference/rest/v1/users.messages#Message
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
}

impl From<GmailMessage> for ResourceSummary {
    fn from(message: GmailMessage) -> Self {
        let headers = message
            .payload
            .map(|payload| payload.headers)
            .unwrap_or_default()
            .into_iter()
            .filter(|header| {
                SUMMARY_HEADERS
                    .iter()
                    .any(|wanted| header.name.eq_ignore_ascii_case(wanted))
            })
            .collect();

        Self {
            id: message.id,
            snippet: message.snippet.unwrap_or_default(),
            headers,
        }
    }
}
