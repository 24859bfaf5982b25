//! Sync orchestrator: protocol events in, store writes and media jobs out.
//!
//! Events are handled one at a time in delivery order. Media fetches run on
//! the worker pool alongside. History batches may repeat messages already
//! seen live; the store's merge-upsert makes that converge, so nothing here
//! deduplicates.


use crate::media::{JobProcessor, MediaStats, MediaWorkerPool};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wacli_core::{
    config::MediaConfig,
    error::WacliError,
    event::{HistoryBatch, LiveMessage, SyncEvent},
    models::{MessageKey, MessageRecord},
    traits::{MessageStore, ProtocolClient},
};

/// Log a progress line every this many stored messages.
const PROGRESS_EVERY: u64 = 100;

/// Lifecycle of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Connecting,
    Listening,
    /// Transport dropped; it reconnects on its own.
    Disconnected,
    Stopped,
}

/// Returned when the sync command ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub synced: bool,
    pub messages_count: u64,
    pub failed_messages: u64,
    pub history_batches: u64,
    pub media: MediaStats,
}

/// Bridges protocol events to the store and the media worker pool.
pub struct SyncOrchestrator {
    store: Arc<dyn MessageStore>,
    client: Arc<dyn ProtocolClient>,
    processor: Arc<dyn JobProcessor>,
    media_config: MediaConfig,
    state: SyncState,
    summary: SyncSummary,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn MessageStore>,
        client: Arc<dyn ProtocolClient>,
        processor: Arc<dyn JobProcessor>,
        media_config: MediaConfig,
    ) -> Self {
        Self {
            store,
            client,
            processor,
            media_config,
            state: SyncState::Idle,
            summary: SyncSummary::default(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Run until `cancel` fires or the event stream fails.
    ///
    /// Per-message failures are counted, not fatal. Failing to connect or
    /// losing the event stream ends the run with an error.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<SyncSummary, WacliError> {
        self.state = SyncState::Connecting;
        info!("starting WhatsApp sync");
        let pool = MediaWorkerPool::start(self.processor.clone(), &self.media_config, &cancel);

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = self.client.start_sync() => Some(res),
        };
        let mut events = match started {
            Some(Ok(rx)) => rx,
            Some(Err(e)) => {
                self.stop(pool).await;
                return Err(e);
            }
            None => return Ok(self.stop(pool).await),
        };

        self.state = SyncState::Listening;
        info!("listening for messages (Ctrl-C to stop)");
        if self.media_config.backfill_on_start {
            self.backfill(&pool).await;
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("sync cancelled");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, &pool).await,
                    None => {
                        self.stop(pool).await;
                        return Err(WacliError::protocol("protocol event stream closed"));
                    }
                }
            }
        }

        let summary = self.stop(pool).await;
        info!(
            "sync completed: {} messages synced, {} failed",
            summary.messages_count, summary.failed_messages
        );
        Ok(summary)
    }

    async fn stop(&mut self, pool: MediaWorkerPool) -> SyncSummary {
        self.client.disconnect().await;
        self.summary.media = pool.shutdown().await;
        self.summary.synced = true;
        self.state = SyncState::Stopped;
        self.summary.clone()
    }

    /// Re-queue media left undownloaded by earlier runs.
    async fn backfill(&self, pool: &MediaWorkerPool) {
        match self.store.pending_media(self.media_config.backfill_limit).await {
            Ok(keys) => {
                if !keys.is_empty() {
                    info!("queueing {} undownloaded media files", keys.len());
                }
                for key in keys {
                    pool.enqueue(key);
                }
            }
            Err(e) => warn!("media re-scan failed: {e}"),
        }
    }

    async fn handle_event(&mut self, event: SyncEvent, pool: &MediaWorkerPool) {
        match event {
            SyncEvent::Connected => {
                self.state = SyncState::Listening;
                info!("connected to WhatsApp");
            }
            SyncEvent::Disconnected => {
                self.state = SyncState::Disconnected;
                warn!("disconnected from WhatsApp");
            }
            SyncEvent::Message(live) => self.handle_live(live, pool).await,
            SyncEvent::HistorySync(batch) => self.handle_history(batch, pool).await,
        }
    }

    async fn handle_live(&mut self, live: LiveMessage, pool: &MediaWorkerPool) {
        // Our own push name says nothing about the chat.
        let push_name = live.push_name.as_deref().filter(|_| !live.is_from_me);
        let name = self
            .client
            .resolve_chat_name(&live.chat_jid, push_name)
            .await;
        self.persist(&live.to_record(), &name, pool).await;
    }

    async fn handle_history(&mut self, batch: HistoryBatch, pool: &MediaWorkerPool) {
        self.summary.history_batches += 1;
        info!(
            "processing history sync ({} conversations, {} messages)",
            batch.conversations.len(),
            batch.message_count()
        );
        for conv in batch.conversations {
            let name = match conv.name.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => self.client.resolve_chat_name(&conv.jid, None).await,
            };
            for msg in &conv.messages {
                self.persist(&msg.to_record(&conv.jid), &name, pool).await;
            }
        }
    }

    /// Chat first, then message, then an optional media job.
    async fn persist(&mut self, record: &MessageRecord, chat_name: &str, pool: &MediaWorkerPool) {
        if let Err(e) = self.write(record, chat_name).await {
            self.summary.failed_messages += 1;
            warn!("failed to store message {}/{}: {e}", record.chat_jid, record.id);
            return;
        }

        if record.media.as_ref().is_some_and(|m| m.is_downloadable()) {
            let status = pool.enqueue(MessageKey::new(&record.id, &record.chat_jid));
            debug!("media job {}: {status:?}", record.id);
        }

        self.summary.messages_count += 1;
        if self.summary.messages_count % PROGRESS_EVERY == 0 {
            info!("synced {} messages", self.summary.messages_count);
        }
    }

    async fn write(&self, record: &MessageRecord, chat_name: &str) -> Result<(), WacliError> {
        if record.id.trim().is_empty() || record.chat_jid.trim().is_empty() {
            return Err(WacliError::Validation(
                "message without ID or chat JID".to_string(),
            ));
        }
        self.store
            .upsert_chat(&record.chat_jid, chat_name, record.timestamp)
            .await?;
        self.store.upsert_message(record).await
    }
}
