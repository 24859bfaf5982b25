//! Field-merge rules applied by the upserts.
//!
//! A later observation of the same chat or message may carry less than an
//! earlier one. These functions decide field by field what survives, so the
//! rules can be tested without a database.

use super::{from_unix, to_unix};
use wacli_core::{
    media::MediaDescriptor,
    models::{MessageDownloadInfo, MessageRecord},
};

/// A `messages` row as read and written by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: String,
    pub chat_jid: String,
    pub sender: String,
    pub content: String,
    pub timestamp: i64,
    pub is_from_me: bool,
    pub media_type: String,
    pub filename: String,
    pub url: String,
    pub direct_path: String,
    pub mime_type: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: i64,
    pub local_path: Option<String>,
    pub downloaded_at: Option<i64>,
}

impl StoredMessage {
    pub fn from_record(record: &MessageRecord) -> Self {
        let media = record.media.clone().unwrap_or_default();
        Self {
            id: record.id.clone(),
            chat_jid: record.chat_jid.clone(),
            sender: record.sender.clone(),
            content: record.content.clone(),
            timestamp: to_unix(record.timestamp),
            is_from_me: record.is_from_me,
            media_type: media.media_type,
            filename: media.filename,
            url: media.url,
            direct_path: media.direct_path,
            mime_type: media.mime_type,
            media_key: media.media_key,
            file_sha256: media.file_sha256,
            file_enc_sha256: media.file_enc_sha256,
            file_length: clamp_length(media.file_length),
            local_path: None,
            downloaded_at: None,
        }
    }

    pub fn media(&self) -> MediaDescriptor {
        MediaDescriptor {
            media_type: self.media_type.clone(),
            filename: self.filename.clone(),
            url: self.url.clone(),
            direct_path: self.direct_path.clone(),
            mime_type: self.mime_type.clone(),
            media_key: self.media_key.clone(),
            file_sha256: self.file_sha256.clone(),
            file_enc_sha256: self.file_enc_sha256.clone(),
            file_length: u64::try_from(self.file_length).unwrap_or(0),
        }
    }

    pub fn into_download_info(self, chat_name: Option<String>) -> MessageDownloadInfo {
        let media = self.media();
        MessageDownloadInfo {
            id: self.id,
            chat_jid: self.chat_jid,
            chat_name: chat_name.filter(|n| !n.trim().is_empty()),
            sender: self.sender,
            content: self.content,
            message_time: from_unix(self.timestamp),
            is_from_me: self.is_from_me,
            media,
            local_path: self.local_path.filter(|p| !p.is_empty()),
            downloaded_at: self.downloaded_at.map(from_unix),
        }
    }
}

fn clamp_length(len: u64) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

/// Decide the stored chat name after observing `incoming`.
///
/// Empty input keeps what is stored. The bare JID only fills an empty or
/// JID-named chat. Any other name replaces the stored one (last write wins
/// between real names).
pub fn merge_chat_name(jid: &str, existing: Option<&str>, incoming: &str) -> String {
    let existing = existing.map(str::trim).filter(|n| !n.is_empty());
    let incoming = incoming.trim();

    if incoming.is_empty() || incoming == jid {
        return existing.unwrap_or(jid).to_string();
    }
    incoming.to_string()
}

/// Merge an incoming observation into the stored row, if any.
///
/// Text and key material are upgraded only by non-empty values, the file
/// length only by a positive one. Timestamp and the from-me flag follow the
/// latest write. Download bookkeeping is never touched by an upsert.
pub fn merge_message(existing: Option<StoredMessage>, incoming: &MessageRecord) -> StoredMessage {
    let new = StoredMessage::from_record(incoming);
    let Some(old) = existing else {
        return new;
    };

    StoredMessage {
        id: old.id,
        chat_jid: old.chat_jid,
        sender: merge_text(old.sender, new.sender),
        content: merge_text(old.content, new.content),
        timestamp: new.timestamp,
        is_from_me: new.is_from_me,
        media_type: merge_text(old.media_type, new.media_type),
        filename: merge_text(old.filename, new.filename),
        url: merge_text(old.url, new.url),
        direct_path: merge_text(old.direct_path, new.direct_path),
        mime_type: merge_text(old.mime_type, new.mime_type),
        media_key: merge_bytes(old.media_key, new.media_key),
        file_sha256: merge_bytes(old.file_sha256, new.file_sha256),
        file_enc_sha256: merge_bytes(old.file_enc_sha256, new.file_enc_sha256),
        file_length: if new.file_length > 0 {
            new.file_length
        } else {
            old.file_length
        },
        local_path: old.local_path,
        downloaded_at: old.downloaded_at,
    }
}

fn merge_text(old: String, new: String) -> String {
    if new.trim().is_empty() {
        old
    } else {
        new
    }
}

fn merge_bytes(old: Vec<u8>, new: Vec<u8>) -> Vec<u8> {
    if new.is_empty() {
        old
    } else {
        new
    }
}
