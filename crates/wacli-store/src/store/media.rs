//! Media download bookkeeping.

use super::{merge::StoredMessage, messages::STORED_MESSAGE_COLUMNS, to_unix, Store};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use wacli_core::{
    error::WacliError,
    models::{MessageDownloadInfo, MessageKey},
};

#[derive(FromRow)]
struct DownloadRow {
    #[sqlx(flatten)]
    message: StoredMessage,
    chat_name: Option<String>,
}

impl Store {
    /// Full media descriptor of one message plus its chat name.
    ///
    /// Without `chat_jid` the ID must be unique across chats.
    pub async fn get_message_for_download(
        &self,
        id: &str,
        chat_jid: Option<&str>,
    ) -> Result<MessageDownloadInfo, WacliError> {
        let chat_jid = chat_jid.map(str::trim).filter(|c| !c.is_empty());
        let sql = format!(
            "SELECT {STORED_MESSAGE_COLUMNS}, c.name AS chat_name \
             FROM messages m LEFT JOIN chats c ON c.jid = m.chat_jid \
             WHERE m.id = ?{}",
            if chat_jid.is_some() {
                " AND m.chat_jid = ?"
            } else {
                ""
            }
        );
        let mut query = sqlx::query_as::<_, DownloadRow>(&sql).bind(id);
        if let Some(chat_jid) = chat_jid {
            query = query.bind(chat_jid);
        }
        let mut rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| WacliError::Storage(format!("failed to load message {id}: {e}")))?;

        match rows.len() {
            0 => Err(WacliError::NotFound(format!("message {id} not found"))),
            1 => {
                let row = rows.remove(0);
                Ok(row.message.into_download_info(row.chat_name))
            }
            matches => Err(WacliError::AmbiguousMessage {
                id: id.to_string(),
                matches,
            }),
        }
    }

    /// Record where a message's media now lives. A later call overwrites the path.
    pub async fn mark_media_downloaded(
        &self,
        id: &str,
        chat_jid: &str,
        local_path: &str,
        downloaded_at: DateTime<Utc>,
    ) -> Result<(), WacliError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            "UPDATE messages SET local_path = ?, downloaded_at = ? WHERE id = ? AND chat_jid = ?",
        )
        .bind(local_path)
        .bind(to_unix(downloaded_at))
        .bind(id)
        .bind(chat_jid)
        .execute(&self.pool)
        .await
        .map_err(|e| WacliError::Storage(format!("failed to mark media downloaded: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(WacliError::NotFound(format!(
                "message {id} not found in chat {chat_jid}"
            )));
        }
        Ok(())
    }

    /// Downloadable messages without a recorded local path, newest first.
    pub async fn pending_media(&self, limit: u32) -> Result<Vec<MessageKey>, WacliError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, chat_jid FROM messages \
             WHERE TRIM(COALESCE(media_type, '')) <> '' \
             AND TRIM(COALESCE(direct_path, '')) <> '' \
             AND LENGTH(COALESCE(media_key, X'')) > 0 \
             AND COALESCE(local_path, '') = '' \
             ORDER BY timestamp DESC, id DESC \
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WacliError::Storage(format!("failed to scan pending media: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(id, chat_jid)| MessageKey::new(id, chat_jid))
            .collect())
    }
}
