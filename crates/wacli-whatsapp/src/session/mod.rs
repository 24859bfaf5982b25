//! WhatsApp session database.
//!
//! Device identity, Signal keys, and app-state bookkeeping all live in one
//! namespaced key/value table inside `{store}/whatsapp.db`, kept apart from
//! the message database. The `transport` feature layers the protocol
//! library's storage traits on top (see `backend`).

#[cfg(feature = "transport")]
mod backend;


use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use wacli_core::error::WacliError;

/// Namespace for wacli's own bookkeeping.
const META: &str = "meta";
const PAIRED_AT: &[u8] = b"paired_at";
/// Push names keyed by contact JID.
const CONTACT_NAME: &str = "contact_name";
/// Group subjects keyed by group JID.
const GROUP_SUBJECT: &str = "group_subject";

/// Separator used when a key is built from several parts.
#[cfg_attr(not(feature = "transport"), allow(dead_code))]
const KEY_SEPARATOR: u8 = 0x1f;

/// SQLite-backed session store.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Open (or create) the session database.
    pub async fn open(db_path: &Path) -> Result<Self, WacliError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    WacliError::Storage(format!("failed to create session dir: {e}"))
                })?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(|e| WacliError::Storage(format!("invalid session db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(opts)
            .await
            .map_err(|e| WacliError::Storage(format!("failed to open session db: {e}")))?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, WacliError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS wa_state (
                namespace TEXT NOT NULL,
                key BLOB NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (namespace, key)
            );",
        )
        .execute(&pool)
        .await
        .map_err(|e| WacliError::Storage(format!("failed to init session schema: {e}")))?;
        Ok(Self { pool })
    }

    /// Whether this device has completed pairing and not been logged out since.
    pub async fn is_paired(&self) -> Result<bool, WacliError> {
        let value = self
            .get(META, PAIRED_AT)
            .await
            .map_err(|e| WacliError::Storage(format!("failed to read pairing state: {e}")))?;
        Ok(value.is_some())
    }

    /// Record a completed pairing. Keeps the first pairing time.
    pub async fn mark_paired(&self) -> Result<(), WacliError> {
        if self.is_paired().await? {
            return Ok(());
        }
        debug!("session paired");
        let now = chrono::Utc::now().to_rfc3339();
        self.put(META, PAIRED_AT, now.as_bytes())
            .await
            .map_err(|e| WacliError::Storage(format!("failed to record pairing: {e}")))
    }

    /// Forget the pairing after the server logged this device out.
    pub async fn clear_pairing(&self) -> Result<(), WacliError> {
        self.delete(META, PAIRED_AT)
            .await
            .map_err(|e| WacliError::Storage(format!("failed to clear pairing: {e}")))
    }

    /// Last push name a contact announced.
    pub async fn contact_name(&self, jid: &str) -> Result<Option<String>, WacliError> {
        self.name(CONTACT_NAME, jid).await
    }

    pub async fn remember_contact_name(&self, jid: &str, name: &str) -> Result<(), WacliError> {
        self.remember_name(CONTACT_NAME, jid, name).await
    }

    /// Last known subject of a group.
    pub async fn group_name(&self, jid: &str) -> Result<Option<String>, WacliError> {
        self.name(GROUP_SUBJECT, jid).await
    }

    pub async fn remember_group_name(&self, jid: &str, name: &str) -> Result<(), WacliError> {
        self.remember_name(GROUP_SUBJECT, jid, name).await
    }

    async fn name(&self, ns: &str, jid: &str) -> Result<Option<String>, WacliError> {
        let value = self
            .get(ns, jid.as_bytes())
            .await
            .map_err(|e| WacliError::Storage(format!("failed to read {ns} for {jid}: {e}")))?;
        Ok(value
            .and_then(|v| String::from_utf8(v).ok())
            .filter(|n| !n.trim().is_empty()))
    }

    /// Blank names are ignored.
    async fn remember_name(&self, ns: &str, jid: &str, name: &str) -> Result<(), WacliError> {
        let name = name.trim();
        if jid.is_empty() || name.is_empty() || name == "-" {
            return Ok(());
        }
        self.put(ns, jid.as_bytes(), name.as_bytes())
            .await
            .map_err(|e| WacliError::Storage(format!("failed to write {ns} for {jid}: {e}")))
    }

    pub(crate) async fn get(&self, ns: &str, key: &[u8]) -> Result<Option<Vec<u8>>, sqlx::Error> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT value FROM wa_state WHERE namespace = ? AND key = ?")
                .bind(ns)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| v))
    }

    pub(crate) async fn put(&self, ns: &str, key: &[u8], value: &[u8]) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR REPLACE INTO wa_state (namespace, key, value) VALUES (?, ?, ?)")
            .bind(ns)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, ns: &str, key: &[u8]) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM wa_state WHERE namespace = ? AND key = ?")
            .bind(ns)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All entries of a namespace, ordered by key.
    #[cfg_attr(not(feature = "transport"), allow(dead_code))]
    pub(crate) async fn scan(&self, ns: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, sqlx::Error> {
        sqlx::query_as("SELECT key, value FROM wa_state WHERE namespace = ? ORDER BY key")
            .bind(ns)
            .fetch_all(&self.pool)
            .await
    }

    /// Entries of a namespace whose key starts with `prefix`.
    #[cfg_attr(not(feature = "transport"), allow(dead_code))]
    pub(crate) async fn scan_prefix(
        &self,
        ns: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT key, value FROM wa_state \
             WHERE namespace = ? AND substr(key, 1, ?) = ? ORDER BY key",
        )
        .bind(ns)
        .bind(prefix.len() as i64)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
    }
}

/// Join key parts with a separator that does not occur in JIDs or names.
#[cfg_attr(not(feature = "transport"), allow(dead_code))]
pub(crate) fn compound_key(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.extend_from_slice(part);
    }
    key
}
