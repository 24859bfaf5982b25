//! Message upsert and filtered listing.

use super::{
    chats::non_blank,
    from_unix, like_pattern,
    merge::{merge_message, StoredMessage},
    to_unix, Store,
};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;
use wacli_core::{
    error::WacliError,
    models::{Message, MessageFilter, MessageRecord},
};

/// Every `messages` column, NULLs folded to empty values.
pub(crate) const STORED_MESSAGE_COLUMNS: &str = "m.id, m.chat_jid, \
     COALESCE(m.sender, '') AS sender, COALESCE(m.content, '') AS content, \
     m.timestamp, m.is_from_me, \
     COALESCE(m.media_type, '') AS media_type, COALESCE(m.filename, '') AS filename, \
     COALESCE(m.url, '') AS url, COALESCE(m.direct_path, '') AS direct_path, \
     COALESCE(m.mime_type, '') AS mime_type, \
     COALESCE(m.media_key, X'') AS media_key, COALESCE(m.file_sha256, X'') AS file_sha256, \
     COALESCE(m.file_enc_sha256, X'') AS file_enc_sha256, \
     COALESCE(m.file_length, 0) AS file_length, \
     m.local_path, m.downloaded_at";

impl Store {
    /// Insert a message or field-merge it into the stored row.
    ///
    /// Creates a placeholder chat (named by its JID) in the same transaction
    /// when the chat has not been seen yet.
    pub async fn upsert_message(&self, record: &MessageRecord) -> Result<(), WacliError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WacliError::Storage(format!("failed to begin transaction: {e}")))?;

        sqlx::query("INSERT OR IGNORE INTO chats (jid, name, last_message_time) VALUES (?, ?, ?)")
            .bind(&record.chat_jid)
            .bind(&record.chat_jid)
            .bind(to_unix(record.timestamp))
            .execute(&mut *tx)
            .await
            .map_err(|e| WacliError::Storage(format!("failed to ensure chat: {e}")))?;

        let existing: Option<StoredMessage> = sqlx::query_as(&format!(
            "SELECT {STORED_MESSAGE_COLUMNS} FROM messages m WHERE m.id = ? AND m.chat_jid = ?"
        ))
        .bind(&record.id)
        .bind(&record.chat_jid)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| WacliError::Storage(format!("failed to read message: {e}")))?;

        if existing.is_some() {
            debug!("merging message {} in {}", record.id, record.chat_jid);
        }
        let row = merge_message(existing, record);

        sqlx::query(
            "INSERT INTO messages (id, chat_jid, sender, content, timestamp, is_from_me, \
             media_type, filename, url, direct_path, mime_type, media_key, file_sha256, \
             file_enc_sha256, file_length, local_path, downloaded_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id, chat_jid) DO UPDATE SET \
             sender = excluded.sender, content = excluded.content, \
             timestamp = excluded.timestamp, is_from_me = excluded.is_from_me, \
             media_type = excluded.media_type, filename = excluded.filename, \
             url = excluded.url, direct_path = excluded.direct_path, \
             mime_type = excluded.mime_type, media_key = excluded.media_key, \
             file_sha256 = excluded.file_sha256, file_enc_sha256 = excluded.file_enc_sha256, \
             file_length = excluded.file_length",
        )
        .bind(&row.id)
        .bind(&row.chat_jid)
        .bind(&row.sender)
        .bind(&row.content)
        .bind(row.timestamp)
        .bind(row.is_from_me)
        .bind(&row.media_type)
        .bind(&row.filename)
        .bind(&row.url)
        .bind(&row.direct_path)
        .bind(&row.mime_type)
        .bind(&row.media_key)
        .bind(&row.file_sha256)
        .bind(&row.file_enc_sha256)
        .bind(row.file_length)
        .bind(&row.local_path)
        .bind(row.downloaded_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| WacliError::Storage(format!("failed to upsert message: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| WacliError::Storage(format!("failed to commit message: {e}")))?;
        Ok(())
    }

    /// Newest-first page of messages matching every predicate in `filter`.
    ///
    /// Messages whose chat row is missing are left out.
    pub async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>, WacliError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT m.id, m.chat_jid, COALESCE(c.name, ''), COALESCE(m.sender, ''), \
             COALESCE(m.content, ''), m.timestamp, m.is_from_me, COALESCE(m.media_type, '') \
             FROM messages m JOIN chats c ON c.jid = m.chat_jid WHERE 1 = 1",
        );
        if let Some(after) = filter.after {
            qb.push(" AND m.timestamp > ").push_bind(to_unix(after));
        }
        if let Some(before) = filter.before {
            qb.push(" AND m.timestamp < ").push_bind(to_unix(before));
        }
        if let Some(sender) = non_blank(filter.sender.as_deref()) {
            qb.push(" AND m.sender = ").push_bind(sender.to_string());
        }
        if let Some(chat_jid) = non_blank(filter.chat_jid.as_deref()) {
            qb.push(" AND m.chat_jid = ").push_bind(chat_jid.to_string());
        }
        if let Some(query) = non_blank(filter.query.as_deref()) {
            qb.push(" AND LOWER(COALESCE(m.content, '')) LIKE LOWER(")
                .push_bind(like_pattern(query))
                .push(") ESCAPE '\\'");
        }
        qb.push(" ORDER BY m.timestamp DESC, m.id DESC LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX));

        let rows: Vec<(String, String, String, String, String, i64, bool, String)> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| WacliError::Storage(format!("failed to list messages: {e}")))?;

        Ok(rows
            .into_iter()
            .map(
                |(id, chat_jid, chat_name, sender, content, timestamp, is_from_me, media_type)| {
                    Message {
                        id,
                        chat_jid,
                        chat_name,
                        sender,
                        content,
                        timestamp: from_unix(timestamp),
                        is_from_me,
                        media_type,
                    }
                },
            )
            .collect())
    }
}
