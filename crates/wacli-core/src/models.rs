//! Chat, message, and contact records as stored and as returned to callers.

use crate::media::MediaDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation: an individual contact or a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub jid: String,
    pub name: String,
    pub last_message_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_is_from_me: Option<bool>,
}

/// A message as listed, decorated with its chat's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_jid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub chat_name: String,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,
}

/// A non-group chat returned by contact search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub phone_number: String,
    pub name: String,
    pub jid: String,
}

/// Identity of one message: IDs are only unique per chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub id: String,
    pub chat_jid: String,
}

impl MessageKey {
    pub fn new(id: impl Into<String>, chat_jid: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            chat_jid: chat_jid.into(),
        }
    }
}

/// One observation of a message, from a live event, a history batch, or a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: String,
    pub chat_jid: String,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    pub media: Option<MediaDescriptor>,
}

/// Everything the media resolver needs about one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDownloadInfo {
    pub id: String,
    pub chat_jid: String,
    pub chat_name: Option<String>,
    pub sender: String,
    pub content: String,
    pub message_time: DateTime<Utc>,
    pub is_from_me: bool,
    pub media: MediaDescriptor,
    pub local_path: Option<String>,
    pub downloaded_at: Option<DateTime<Utc>>,
}

impl MessageDownloadInfo {
    pub fn is_downloadable(&self) -> bool {
        self.media.is_downloadable()
    }
}

/// Default page size for listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Conjunction of optional predicates over messages, plus pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFilter {
    /// Exclusive lower time bound.
    pub after: Option<DateTime<Utc>>,
    /// Exclusive upper time bound.
    pub before: Option<DateTime<Utc>>,
    pub sender: Option<String>,
    pub chat_jid: Option<String>,
    /// Case-insensitive substring of the content.
    pub query: Option<String>,
    pub limit: u32,
    pub page: u32,
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self {
            after: None,
            before: None,
            sender: None,
            chat_jid: None,
            query: None,
            limit: DEFAULT_PAGE_SIZE,
            page: 0,
        }
    }
}

impl MessageFilter {
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.limit)
    }
}

/// Chat listing filter: substring over name or JID, plus pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatFilter {
    pub query: Option<String>,
    pub limit: u32,
    pub page: u32,
}

impl Default for ChatFilter {
    fn default() -> Self {
        Self {
            query: None,
            limit: DEFAULT_PAGE_SIZE,
            page: 0,
        }
    }
}

impl ChatFilter {
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.limit)
    }
}

/// Address-book entry reported by the protocol layer for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactInfo {
    pub full_name: String,
    pub first_name: String,
    pub business_name: String,
    pub push_name: String,
    pub redacted_phone: String,
}

impl ContactInfo {
    /// The most human-readable name available, if any.
    pub fn best_name(&self) -> Option<String> {
        [
            self.full_name.as_str(),
            self.first_name.as_str(),
            self.business_name.as_str(),
            self.push_name.as_str(),
            self.redacted_phone.as_str(),
        ]
        .into_iter()
        .map(str::trim)
        .find(|name| !name.is_empty() && *name != "-")
        .map(str::to_string)
    }
}
