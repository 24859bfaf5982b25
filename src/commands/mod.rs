//! Command surface: one method per CLI command.
//!
//! Every method returns a typed result; `main` renders it into the JSON
//! envelope. Arguments are validated before any I/O.


use crate::media::MediaResolver;
use crate::sync::{SyncOrchestrator, SyncSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wacli_core::{
    config::Config,
    error::WacliError,
    jid,
    models::{Chat, ChatFilter, Contact, Message, MessageFilter, MessageRecord},
    traits::{MessageStore, ProtocolClient},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResponse {
    pub authenticated: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendResponse {
    pub sent: bool,
    pub recipient: String,
    pub chat_jid: String,
    pub message_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadResponse {
    pub message_id: String,
    pub chat_jid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_name: Option<String>,
    pub path: String,
    pub bytes: u64,
    pub media_type: String,
    pub mime_type: String,
    pub downloaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionResponse {
    pub version: String,
}

pub fn version() -> VersionResponse {
    VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn required(value: &str, message: &str) -> Result<String, WacliError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(WacliError::Validation(message.to_string()));
    }
    Ok(value.to_string())
}

fn check_limit(limit: u32) -> Result<(), WacliError> {
    if limit == 0 {
        return Err(WacliError::Validation(
            "limit must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Non-blank trimmed value, if any.
fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Holds the store and protocol client for one process.
pub struct App {
    store: Arc<dyn MessageStore>,
    client: Arc<dyn ProtocolClient>,
    config: Config,
}

impl App {
    pub fn new(
        store: Arc<dyn MessageStore>,
        client: Arc<dyn ProtocolClient>,
        config: Config,
    ) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    fn resolver(&self) -> MediaResolver {
        MediaResolver::new(
            self.store.clone(),
            self.client.clone(),
            self.config.store.root(),
        )
    }

    /// Pair this device unless it already is.
    pub async fn auth(&self) -> Result<AuthResponse, WacliError> {
        if self.client.is_authenticated().await {
            return Ok(AuthResponse {
                authenticated: true,
                message: "Already authenticated".to_string(),
            });
        }
        self.client.authenticate().await?;
        Ok(AuthResponse {
            authenticated: true,
            message: "Successfully authenticated".to_string(),
        })
    }

    pub async fn list_messages(&self, filter: MessageFilter) -> Result<Vec<Message>, WacliError> {
        check_limit(filter.limit)?;
        let filter = MessageFilter {
            sender: optional(filter.sender),
            chat_jid: optional(filter.chat_jid),
            query: optional(filter.query),
            ..filter
        };
        if let (Some(after), Some(before)) = (filter.after, filter.before) {
            if after >= before {
                return Err(WacliError::Validation(
                    "--after must be earlier than --before".to_string(),
                ));
            }
        }
        self.store.list_messages(&filter).await
    }

    /// Content search across all chats.
    pub async fn search_messages(
        &self,
        query: &str,
        limit: u32,
        page: u32,
    ) -> Result<Vec<Message>, WacliError> {
        let query = required(query, "query is required")?;
        self.list_messages(MessageFilter {
            query: Some(query),
            limit,
            page,
            ..Default::default()
        })
        .await
    }

    pub async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, WacliError> {
        let query = required(query, "query is required")?;
        self.store.search_contacts(&query).await
    }

    pub async fn list_chats(&self, filter: ChatFilter) -> Result<Vec<Chat>, WacliError> {
        check_limit(filter.limit)?;
        let filter = ChatFilter {
            query: optional(filter.query),
            ..filter
        };
        self.store.list_chats(&filter).await
    }

    /// Send a text, then record it locally as an outgoing message.
    ///
    /// A failed local write is logged; the message was still sent.
    pub async fn send_message(
        &self,
        recipient: &str,
        text: &str,
    ) -> Result<SendResponse, WacliError> {
        let recipient = required(recipient, "recipient is required")?;
        if text.trim().is_empty() {
            return Err(WacliError::Validation("message is required".to_string()));
        }
        let chat_jid = jid::normalize_recipient(&recipient);

        self.client.connect().await?;
        let message_id = self.client.send_message(&chat_jid, text).await?;
        info!("sent message {message_id} to {chat_jid}");

        let now = Utc::now();
        let name = match self.client.resolve_chat_name(&chat_jid, None).await {
            name if name.trim().is_empty() => recipient.clone(),
            name => name,
        };
        let record = MessageRecord {
            id: message_id.clone(),
            chat_jid: chat_jid.clone(),
            sender: "me".to_string(),
            content: text.to_string(),
            timestamp: now,
            is_from_me: true,
            media: None,
        };
        if let Err(e) = self.record_sent(&record, &name).await {
            warn!("message sent but not stored locally: {e}");
        }

        Ok(SendResponse {
            sent: true,
            recipient,
            chat_jid,
            message_id,
            message: text.to_string(),
        })
    }

    async fn record_sent(&self, record: &MessageRecord, name: &str) -> Result<(), WacliError> {
        self.store
            .upsert_chat(&record.chat_jid, name, record.timestamp)
            .await?;
        self.store.upsert_message(record).await
    }

    /// Download one message's media, to `output` or the default media path.
    pub async fn download_media(
        &self,
        message_id: &str,
        chat_jid: Option<&str>,
        output: Option<&str>,
    ) -> Result<DownloadResponse, WacliError> {
        let message_id = required(message_id, "message ID is required")?;
        let chat_jid = chat_jid.map(str::trim).filter(|c| !c.is_empty());

        let info = self
            .store
            .get_message_for_download(&message_id, chat_jid)
            .await?;
        if !info.is_downloadable() {
            return Err(WacliError::NoDownloadableMedia(message_id));
        }

        self.client.connect().await?;
        let done = self.resolver().download_and_record(&info, output).await?;

        Ok(DownloadResponse {
            message_id,
            chat_jid: info.chat_jid,
            chat_name: info.chat_name.filter(|n| !n.trim().is_empty()),
            path: done.path.to_string_lossy().into_owned(),
            bytes: done.bytes,
            media_type: info.media.media_type,
            mime_type: info.media.mime_type,
            downloaded_at: done.downloaded_at,
        })
    }

    /// Long-running sync until `cancel` fires.
    pub async fn sync(&self, cancel: CancellationToken) -> Result<SyncSummary, WacliError> {
        let mut orchestrator = SyncOrchestrator::new(
            self.store.clone(),
            self.client.clone(),
            Arc::new(self.resolver()),
            self.config.media.clone(),
        );
        orchestrator.run(cancel).await
    }
}
