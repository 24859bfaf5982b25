//! WhatsApp client backed by `whatsapp-rust`.
//!
//! Uses the WhatsApp Web protocol (Noise handshake + Signal encryption).
//! Pairing is done by scanning a QR code, like WhatsApp Web. Session state
//! lives in the [`SessionStore`].

mod events;
mod media;
mod send;

use crate::qr::show_pairing_code;
use crate::session::SessionStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wacore::types::events::Event;
use wacore_binary::jid::Jid;
use wacli_core::{
    error::WacliError,
    event::SyncEvent,
    media::MediaDownloadRequest,
    models::ContactInfo,
    traits::ProtocolClient,
};
use whatsapp_rust::bot::Bot;
use whatsapp_rust::client::Client;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

/// Buffered protocol events awaiting the sync orchestrator.
const EVENT_BUFFER: usize = 256;

/// Connection state as reported by protocol events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Starting,
    Connected,
    Disconnected,
    LoggedOut,
}

/// State shared with the event callback.
struct Shared {
    session: SessionStore,
    client: Mutex<Option<Arc<Client>>>,
    link: watch::Sender<LinkState>,
    events: Mutex<Option<mpsc::Sender<SyncEvent>>>,
}

/// [`ProtocolClient`] over the WhatsApp Web protocol.
pub struct WhatsAppClient {
    shared: Arc<Shared>,
    bot: Mutex<Option<JoinHandle<()>>>,
}

impl WhatsAppClient {
    pub fn new(session: SessionStore) -> Self {
        let (link, _) = watch::channel(LinkState::Starting);
        Self {
            shared: Arc::new(Shared {
                session,
                client: Mutex::new(None),
                link,
                events: Mutex::new(None),
            }),
            bot: Mutex::new(None),
        }
    }

    /// Build and start the bot once per process.
    async fn ensure_running(&self) -> Result<(), WacliError> {
        let mut bot_slot = self.bot.lock().await;
        if bot_slot.is_some() {
            return Ok(());
        }

        let backend = Arc::new(self.shared.session.clone());
        let shared = self.shared.clone();
        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some("wacli".to_string()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, client| {
                let shared = shared.clone();
                async move { shared.handle_event(event, client).await }
            })
            .build()
            .await
            .map_err(|e| WacliError::protocol(format!("whatsapp bot build failed: {e}")))?;

        *self.shared.client.lock().await = Some(bot.client());

        let handle = bot
            .run()
            .await
            .map_err(|e| WacliError::protocol(format!("whatsapp bot run failed: {e}")))?;
        *bot_slot = Some(handle);
        info!("WhatsApp client started");
        Ok(())
    }

    /// Wait until the link is up. Fails if the server logged this device out.
    async fn wait_connected(&self) -> Result<Arc<Client>, WacliError> {
        let mut link = self.shared.link.subscribe();
        let state = link
            .wait_for(|s| matches!(s, LinkState::Connected | LinkState::LoggedOut))
            .await
            .map_err(|_| WacliError::protocol("whatsapp client stopped"))?;
        if *state == LinkState::LoggedOut {
            return Err(WacliError::protocol(
                "device was logged out; run `wacli auth` to pair again",
            ));
        }
        drop(state);
        self.shared
            .client
            .lock()
            .await
            .clone()
            .ok_or_else(|| WacliError::protocol("whatsapp client not connected"))
    }
}

impl Shared {
    async fn handle_event(&self, event: Event, client: Arc<Client>) {
        match event {
            Event::PairingQrCode { code, .. } => {
                info!("WhatsApp QR code generated (scan to pair)");
                show_pairing_code(&code);
            }
            Event::PairSuccess(_) => {
                info!("WhatsApp pairing successful");
                if let Err(e) = self.session.mark_paired().await {
                    warn!("{e}");
                }
            }
            Event::Connected(_) => {
                info!("WhatsApp connected");
                if let Err(e) = self.session.mark_paired().await {
                    warn!("{e}");
                }
                *self.client.lock().await = Some(client);
                self.link.send_replace(LinkState::Connected);
                self.forward(SyncEvent::Connected).await;
            }
            Event::Disconnected(_) => {
                warn!("WhatsApp disconnected");
                self.link.send_replace(LinkState::Disconnected);
                self.forward(SyncEvent::Disconnected).await;
            }
            Event::LoggedOut(_) => {
                warn!("WhatsApp logged out, session invalidated");
                if let Err(e) = self.session.clear_pairing().await {
                    warn!("{e}");
                }
                *self.client.lock().await = None;
                self.link.send_replace(LinkState::LoggedOut);
                // Dropping the sender ends the event stream.
                *self.events.lock().await = None;
            }
            Event::Message(msg, info) => {
                let live = events::live_message(&msg, &info);
                if let Some(push) = live.push_name.as_deref() {
                    if !wacli_core::jid::is_group(&live.chat_jid) {
                        let remembered =
                            self.session.remember_contact_name(&live.chat_jid, push).await;
                        if let Err(e) = remembered {
                            debug!("{e}");
                        }
                    }
                }
                self.forward(SyncEvent::Message(live)).await;
            }
            Event::HistorySync(sync) => {
                let batch = events::history_batch(&sync);
                for conv in &batch.conversations {
                    if let Some(name) = conv.name.as_deref() {
                        if wacli_core::jid::is_group(&conv.jid) {
                            let remembered = self.session.remember_group_name(&conv.jid, name).await;
                            if let Err(e) = remembered {
                                debug!("{e}");
                            }
                        }
                    }
                }
                debug!(
                    "history sync: {} conversations, {} messages",
                    batch.conversations.len(),
                    batch.message_count()
                );
                self.forward(SyncEvent::HistorySync(batch)).await;
            }
            _ => {}
        }
    }

    async fn forward(&self, event: SyncEvent) {
        let tx = self.events.lock().await.clone();
        if let Some(tx) = tx {
            if tx.send(event).await.is_err() {
                debug!("sync receiver dropped");
            }
        }
    }
}

#[async_trait]
impl ProtocolClient for WhatsAppClient {
    async fn is_authenticated(&self) -> bool {
        match self.shared.session.is_paired().await {
            Ok(paired) => paired,
            Err(e) => {
                warn!("{e}");
                false
            }
        }
    }

    async fn authenticate(&self) -> Result<(), WacliError> {
        self.ensure_running().await?;
        self.wait_connected().await?;
        self.shared.session.mark_paired().await
    }

    async fn connect(&self) -> Result<(), WacliError> {
        self.ensure_running().await?;
        self.wait_connected().await.map(|_| ())
    }

    async fn disconnect(&self) {
        *self.shared.events.lock().await = None;
        *self.shared.client.lock().await = None;
        if let Some(handle) = self.bot.lock().await.take() {
            handle.abort();
        }
        self.shared.link.send_replace(LinkState::Disconnected);
        info!("WhatsApp client stopped");
    }

    async fn send_message(&self, recipient: &str, text: &str) -> Result<String, WacliError> {
        self.connect().await?;
        let client = self.wait_connected().await?;
        let jid: Jid = recipient.parse().map_err(|e| {
            WacliError::Validation(format!("invalid recipient JID '{recipient}': {e}"))
        })?;
        let msg = waproto::whatsapp::Message {
            conversation: Some(text.to_string()),
            ..Default::default()
        };
        send::retry_send(&client, &jid, msg).await
    }

    async fn lookup_contact(&self, jid: &str) -> Option<ContactInfo> {
        let push_name = self.shared.session.contact_name(jid).await.ok()??;
        Some(ContactInfo {
            push_name,
            ..Default::default()
        })
    }

    /// Live group metadata when connected, else the last subject seen.
    async fn lookup_group_name(&self, jid: &str) -> Option<String> {
        let client = self.shared.client.lock().await.clone();
        if let (Some(client), Ok(group)) = (client, jid.parse::<Jid>()) {
            match client.groups().get_metadata(&group).await {
                Ok(meta) if !meta.subject.trim().is_empty() => {
                    let session = &self.shared.session;
                    if let Err(e) = session.remember_group_name(jid, &meta.subject).await {
                        debug!("{e}");
                    }
                    return Some(meta.subject);
                }
                Ok(_) => {}
                Err(e) => debug!("group metadata for {jid} unavailable: {e}"),
            }
        }
        self.shared.session.group_name(jid).await.ok()?
    }

    async fn fetch_media(
        &self,
        request: &MediaDownloadRequest,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, WacliError> {
        self.connect().await?;
        let client = self.wait_connected().await?;
        let bytes = media::download(&client, request).await?;
        sink.write_all(&bytes).await?;
        sink.flush().await?;
        Ok(bytes.len() as u64)
    }

    async fn start_sync(&self) -> Result<mpsc::Receiver<SyncEvent>, WacliError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        *self.shared.events.lock().await = Some(tx);
        self.connect().await?;
        Ok(rx)
    }
}
