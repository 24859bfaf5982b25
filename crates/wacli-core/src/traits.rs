use crate::{
    error::WacliError,
    event::SyncEvent,
    jid,
    media::MediaDownloadRequest,
    models::{
        Chat, ChatFilter, Contact, ContactInfo, Message, MessageDownloadInfo, MessageFilter,
        MessageKey, MessageRecord,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

/// Message Store capability: the sole writer of persisted chats and messages.
///
/// Upserts are merges: repeated or partial observations of the same
/// `(id, chat_jid)` converge to one row regardless of arrival order.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a chat, or update it without regressing a real name to the bare JID.
    async fn upsert_chat(
        &self,
        jid: &str,
        name: &str,
        last_message_time: DateTime<Utc>,
    ) -> Result<(), WacliError>;

    /// Insert a message, or field-merge it into the existing row.
    async fn upsert_message(&self, record: &MessageRecord) -> Result<(), WacliError>;

    /// Newest-first page of messages matching every given predicate.
    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>, WacliError>;

    /// Chats ordered by most recent activity.
    async fn list_chats(&self, filter: &ChatFilter) -> Result<Vec<Chat>, WacliError>;

    /// Non-group chats matching the query, alphabetical, at most 50.
    async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, WacliError>;

    /// Full media descriptor of one message.
    ///
    /// Without `chat_jid`, an ID present in several chats is ambiguous.
    async fn get_message_for_download(
        &self,
        id: &str,
        chat_jid: Option<&str>,
    ) -> Result<MessageDownloadInfo, WacliError>;

    /// Record where a message's media was written. Overwrites earlier paths.
    async fn mark_media_downloaded(
        &self,
        id: &str,
        chat_jid: &str,
        local_path: &str,
        downloaded_at: DateTime<Utc>,
    ) -> Result<(), WacliError>;

    /// Messages with downloadable media and no recorded local path, newest first.
    async fn pending_media(&self, limit: u32) -> Result<Vec<MessageKey>, WacliError>;
}

/// WhatsApp protocol capability for pairing, transport, sending and media fetch.
///
/// Treated as a black box; the real implementation lives in `wacli-whatsapp`.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Whether a paired device identity exists.
    async fn is_authenticated(&self) -> bool;

    /// Render a pairing code and wait until paired.
    async fn authenticate(&self) -> Result<(), WacliError>;

    /// Connect, pairing first if needed. Idempotent once connected.
    async fn connect(&self) -> Result<(), WacliError>;

    /// Graceful disconnect.
    async fn disconnect(&self);

    /// Send a text message. Returns the message ID assigned by the protocol.
    async fn send_message(&self, recipient: &str, text: &str) -> Result<String, WacliError>;

    /// Address-book lookup for an individual JID.
    async fn lookup_contact(&self, _jid: &str) -> Option<ContactInfo> {
        None
    }

    /// Group subject lookup for a group JID.
    async fn lookup_group_name(&self, _jid: &str) -> Option<String> {
        None
    }

    /// Best display name for a chat.
    ///
    /// Group/contact lookup first, then the event's push name, then the raw JID.
    /// A push name names its sender, so it is only used for one-to-one chats.
    async fn resolve_chat_name(&self, chat_jid: &str, push_name: Option<&str>) -> String {
        let shared = jid::is_group(chat_jid) || jid::is_broadcast(chat_jid);
        let looked_up = if shared {
            self.lookup_group_name(chat_jid).await
        } else {
            self.lookup_contact(chat_jid)
                .await
                .and_then(|info| info.best_name())
        };
        if let Some(name) = looked_up
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
        {
            return name;
        }
        if let Some(push) = push_name
            .filter(|_| !shared)
            .map(str::trim)
            .filter(|p| !p.is_empty() && *p != "-")
        {
            return push.to_string();
        }
        chat_jid.to_string()
    }

    /// Fetch and decrypt one media blob into `sink`. Returns bytes written.
    ///
    /// Bytes may already be in `sink` when this fails; callers own atomicity.
    async fn fetch_media(
        &self,
        request: &MediaDownloadRequest,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, WacliError>;

    /// Register for protocol events and connect.
    ///
    /// The stream ends when the transport stops for good.
    async fn start_sync(&self) -> Result<mpsc::Receiver<SyncEvent>, WacliError>;
}
