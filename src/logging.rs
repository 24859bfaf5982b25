//! Tracing setup. Stdout carries the JSON envelope only, so logs go to
//! stderr and, when configured, to a log file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wacli_core::config::{shellexpand, LogConfig};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `log.level`, which wins over `default_level`.
/// Keep the returned guard alive until exit so buffered file logs flush.
pub fn init(config: &LogConfig, default_level: &str) -> anyhow::Result<Option<WorkerGuard>> {
    let level = config
        .level
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(default_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match config.file.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(file) => {
            let path = shellexpand(file);
            let path = Path::new(&path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
