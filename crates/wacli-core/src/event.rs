//! Protocol events the sync orchestrator understands.
//!
//! The transport maps its open set of event shapes onto this closed set and
//! silently drops everything else.

use crate::media::MediaDescriptor;
use crate::models::MessageRecord;
use chrono::{DateTime, Utc};

/// One inbound protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A message delivered in real time.
    Message(LiveMessage),
    /// A bulk backfill of past conversations.
    HistorySync(HistoryBatch),
    /// The websocket session is up.
    Connected,
    /// The websocket session dropped; the transport may reconnect on its own.
    Disconnected,
}

/// A real-time message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveMessage {
    pub id: String,
    pub chat_jid: String,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    /// Sender's self-chosen display name, when the event carried one.
    pub push_name: Option<String>,
    pub media: Option<MediaDescriptor>,
}

impl LiveMessage {
    pub fn to_record(&self) -> MessageRecord {
        MessageRecord {
            id: self.id.clone(),
            chat_jid: self.chat_jid.clone(),
            sender: self.sender.clone(),
            content: self.content.clone(),
            timestamp: self.timestamp,
            is_from_me: self.is_from_me,
            media: self.media.clone(),
        }
    }
}

/// A history-sync delivery: several conversations with their past messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryBatch {
    pub conversations: Vec<HistoryConversation>,
}

impl HistoryBatch {
    pub fn message_count(&self) -> usize {
        self.conversations.iter().map(|c| c.messages.len()).sum()
    }
}

/// One conversation inside a history batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConversation {
    pub jid: String,
    /// Conversation or group name reported by the protocol, often empty.
    pub name: Option<String>,
    /// Messages in delivery order.
    pub messages: Vec<HistoryMessage>,
}

/// A past message inside a history conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: String,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    pub media: Option<MediaDescriptor>,
}

impl HistoryMessage {
    pub fn to_record(&self, chat_jid: &str) -> MessageRecord {
        MessageRecord {
            id: self.id.clone(),
            chat_jid: chat_jid.to_string(),
            sender: self.sender.clone(),
            content: self.content.clone(),
            timestamp: self.timestamp,
            is_from_me: self.is_from_me,
            media: self.media.clone(),
        }
    }
}
