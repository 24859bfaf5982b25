//! SQLite-backed message store.
//!
//! Split into focused submodules:
//! - `merge`: field-merge rules for chats and messages
//! - `chats`: chat upsert, chat listing, contact search
//! - `messages`: message upsert and filtered listing
//! - `media`: download lookup, completion bookkeeping, pending re-scan

mod chats;
mod media;
pub mod merge;
mod messages;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use wacli_core::{
    config::StoreConfig,
    error::WacliError,
    models::{
        Chat, ChatFilter, Contact, Message, MessageDownloadInfo, MessageFilter, MessageKey,
        MessageRecord,
    },
    traits::MessageStore,
};

/// Columns added after the initial schema, checked on every open.
const ADDITIVE_MESSAGE_COLUMNS: &[(&str, &str)] = &[
    ("direct_path", "TEXT"),
    ("mime_type", "TEXT"),
    ("local_path", "TEXT"),
    ("downloaded_at", "INTEGER"),
];

/// Persistent chat/message store backed by SQLite.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    /// Serializes read-modify-write upserts across in-process writers.
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    /// Open the message database under the configured storage root.
    pub async fn new(config: &StoreConfig) -> Result<Self, WacliError> {
        Self::open(&config.messages_db_path()).await
    }

    /// Open (or create) a database file, running migrations on first use.
    pub async fn open(db_path: &Path) -> Result<Self, WacliError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    WacliError::Storage(format!("failed to create store dir: {e}"))
                })?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(|e| WacliError::Storage(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| WacliError::Storage(format!("failed to connect to sqlite: {e}")))?;

        Self::run_migrations(&pool).await?;

        info!("message store opened at {}", db_path.display());

        Ok(Self::from_pool(pool))
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run SQL migrations, tracking which have already been applied.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), WacliError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| WacliError::Storage(format!("failed to create migrations table: {e}")))?;

        let migrations: &[(&str, &str)] = &[
            ("001_init", include_str!("../../migrations/001_init.sql")),
            ("002_indexes", include_str!("../../migrations/002_indexes.sql")),
        ];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        WacliError::Storage(format!("failed to check migration {name}: {e}"))
                    })?;

            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql)
                .execute(pool)
                .await
                .map_err(|e| WacliError::Storage(format!("migration {name} failed: {e}")))?;

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| {
                    WacliError::Storage(format!("failed to record migration {name}: {e}"))
                })?;
        }

        Self::ensure_message_columns(pool).await
    }

    /// Add any missing media columns to `messages`. Never drops or rewrites.
    async fn ensure_message_columns(pool: &SqlitePool) -> Result<(), WacliError> {
        let existing: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('messages')")
                .fetch_all(pool)
                .await
                .map_err(|e| WacliError::Storage(format!("failed to inspect messages: {e}")))?;

        for (column, sql_type) in ADDITIVE_MESSAGE_COLUMNS {
            if existing.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                continue;
            }
            let ddl = format!("ALTER TABLE messages ADD COLUMN {column} {sql_type}");
            match sqlx::query(&ddl).execute(pool).await {
                Ok(_) => info!("added messages.{column}"),
                // Another process may have added it between the check and the ALTER.
                Err(e) if e.to_string().contains("duplicate column") => {}
                Err(e) => {
                    return Err(WacliError::Storage(format!(
                        "failed to add column {column}: {e}"
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Unix seconds as stored in INTEGER columns.
pub(crate) fn to_unix(time: DateTime<Utc>) -> i64 {
    time.timestamp()
}

pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// `%query%` pattern with LIKE wildcards escaped by `\`.
///
/// Case folding happens in SQL, with `LOWER()` on both sides, so the
/// pattern and the column fold the same way.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl MessageStore for Store {
    async fn upsert_chat(
        &self,
        jid: &str,
        name: &str,
        last_message_time: DateTime<Utc>,
    ) -> Result<(), WacliError> {
        Store::upsert_chat(self, jid, name, last_message_time).await
    }

    async fn upsert_message(&self, record: &MessageRecord) -> Result<(), WacliError> {
        Store::upsert_message(self, record).await
    }

    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>, WacliError> {
        Store::list_messages(self, filter).await
    }

    async fn list_chats(&self, filter: &ChatFilter) -> Result<Vec<Chat>, WacliError> {
        Store::list_chats(self, filter).await
    }

    async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, WacliError> {
        Store::search_contacts(self, query).await
    }

    async fn get_message_for_download(
        &self,
        id: &str,
        chat_jid: Option<&str>,
    ) -> Result<MessageDownloadInfo, WacliError> {
        Store::get_message_for_download(self, id, chat_jid).await
    }

    async fn mark_media_downloaded(
        &self,
        id: &str,
        chat_jid: &str,
        local_path: &str,
        downloaded_at: DateTime<Utc>,
    ) -> Result<(), WacliError> {
        Store::mark_media_downloaded(self, id, chat_jid, local_path, downloaded_at).await
    }

    async fn pending_media(&self, limit: u32) -> Result<Vec<MessageKey>, WacliError> {
        Store::pending_media(self, limit).await
    }
}
