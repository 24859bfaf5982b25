//! Chat upsert, chat listing, and contact search.

use super::{from_unix, like_pattern, merge::merge_chat_name, to_unix, Store};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use wacli_core::{
    error::WacliError,
    jid,
    models::{Chat, ChatFilter, Contact},
};

/// Contact search never returns more than this many rows.
const CONTACT_SEARCH_LIMIT: i64 = 50;

impl Store {
    /// Insert a chat or merge into the existing row.
    ///
    /// The name follows [`merge_chat_name`]; the last-message time only moves forward.
    pub async fn upsert_chat(
        &self,
        jid: &str,
        name: &str,
        last_message_time: DateTime<Utc>,
    ) -> Result<(), WacliError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WacliError::Storage(format!("failed to begin transaction: {e}")))?;

        let existing: Option<(Option<String>, i64)> =
            sqlx::query_as("SELECT name, last_message_time FROM chats WHERE jid = ?")
                .bind(jid)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| WacliError::Storage(format!("failed to read chat: {e}")))?;

        let incoming_time = to_unix(last_message_time);
        let (name, time) = match &existing {
            Some((old_name, old_time)) => (
                merge_chat_name(jid, old_name.as_deref(), name),
                incoming_time.max(*old_time),
            ),
            None => (merge_chat_name(jid, None, name), incoming_time),
        };

        sqlx::query(
            "INSERT INTO chats (jid, name, last_message_time) VALUES (?, ?, ?) \
             ON CONFLICT(jid) DO UPDATE SET \
             name = excluded.name, last_message_time = excluded.last_message_time",
        )
        .bind(jid)
        .bind(&name)
        .bind(time)
        .execute(&mut *tx)
        .await
        .map_err(|e| WacliError::Storage(format!("failed to upsert chat: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| WacliError::Storage(format!("failed to commit chat: {e}")))?;
        Ok(())
    }

    /// Chats by most recent activity, with a preview of the newest message.
    pub async fn list_chats(&self, filter: &ChatFilter) -> Result<Vec<Chat>, WacliError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT c.jid, COALESCE(c.name, ''), c.last_message_time, \
             (SELECT m.content FROM messages m WHERE m.chat_jid = c.jid \
              ORDER BY m.timestamp DESC, m.id DESC LIMIT 1), \
             (SELECT m.sender FROM messages m WHERE m.chat_jid = c.jid \
              ORDER BY m.timestamp DESC, m.id DESC LIMIT 1), \
             (SELECT m.is_from_me FROM messages m WHERE m.chat_jid = c.jid \
              ORDER BY m.timestamp DESC, m.id DESC LIMIT 1) \
             FROM chats c WHERE 1 = 1",
        );
        if let Some(query) = non_blank(filter.query.as_deref()) {
            let pattern = like_pattern(query);
            qb.push(" AND (LOWER(COALESCE(c.name, '')) LIKE LOWER(")
                .push_bind(pattern.clone())
                .push(") ESCAPE '\\' OR LOWER(c.jid) LIKE LOWER(")
                .push_bind(pattern)
                .push(") ESCAPE '\\')");
        }
        qb.push(" ORDER BY c.last_message_time DESC, c.jid LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX));

        let rows: Vec<(
            String,
            String,
            i64,
            Option<String>,
            Option<String>,
            Option<bool>,
        )> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| WacliError::Storage(format!("failed to list chats: {e}")))?;

        Ok(rows
            .into_iter()
            .map(
                |(jid, name, time, last_message, last_sender, last_is_from_me)| Chat {
                    jid,
                    name,
                    last_message_time: from_unix(time),
                    last_message,
                    last_sender,
                    last_is_from_me,
                },
            )
            .collect())
    }

    /// Non-group chats whose name or JID contains `query`, alphabetical.
    pub async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, WacliError> {
        let pattern = like_pattern(query.trim());
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT jid, COALESCE(name, '') FROM chats \
             WHERE jid NOT LIKE '%@g.us' \
             AND (LOWER(COALESCE(name, '')) LIKE LOWER(?) ESCAPE '\\' OR LOWER(jid) LIKE LOWER(?) ESCAPE '\\') \
             ORDER BY COALESCE(name, ''), jid \
             LIMIT ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(CONTACT_SEARCH_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WacliError::Storage(format!("failed to search contacts: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(jid, name)| Contact {
                phone_number: jid::user(&jid).to_string(),
                name,
                jid,
            })
            .collect())
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
