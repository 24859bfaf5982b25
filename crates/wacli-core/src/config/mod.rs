mod defaults;


use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::WacliError;
use defaults::*;

/// Top-level wacli configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Where the message database, session database, and media files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

impl StoreConfig {
    /// Storage root with `~` expanded.
    pub fn root(&self) -> PathBuf {
        PathBuf::from(shellexpand(&self.dir))
    }

    /// Path of the chats/messages database.
    pub fn messages_db_path(&self) -> PathBuf {
        self.root().join("messages.db")
    }

    /// Path of the WhatsApp session database (keys, device identity).
    pub fn session_db_path(&self) -> PathBuf {
        self.root().join("whatsapp.db")
    }
}

/// Media download worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Number of concurrent download workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Buffered job queue size. Defaults to `workers * 4`.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// Upper bound for a detached enqueue attempt when the queue is full.
    #[serde(default = "default_enqueue_timeout")]
    pub enqueue_timeout_secs: u64,
    /// How long shutdown waits for in-flight jobs before abandoning them.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// Re-scan the store for undownloaded media when sync starts.
    #[serde(default = "default_true")]
    pub backfill_on_start: bool,
    /// Maximum messages picked up by one re-scan.
    #[serde(default = "default_backfill_limit")]
    pub backfill_limit: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: None,
            enqueue_timeout_secs: default_enqueue_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
            backfill_on_start: default_true(),
            backfill_limit: default_backfill_limit(),
        }
    }
}

impl MediaConfig {
    /// Worker count, never zero.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            2
        } else {
            self.workers
        }
    }

    /// Queue capacity, never zero.
    pub fn effective_queue_capacity(&self) -> usize {
        match self.queue_capacity {
            Some(n) if n > 0 => n,
            _ => self.effective_workers() * 4,
        }
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_secs(self.enqueue_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Settings for one-shot commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Overall bound for every command except `sync`.
    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_command_timeout(),
        }
    }
}

impl CommandConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging settings. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: Option<String>,
    /// Optional log file; logs always go to stderr as well.
    #[serde(default)]
    pub file: Option<String>,
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, WacliError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::debug!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| WacliError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| WacliError::Config(format!("failed to parse config: {}", e)))?;

    Ok(config)
}
