//! In-process fakes shared by the binary's unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use wacli_core::{
    error::WacliError,
    event::SyncEvent,
    media::{MediaDescriptor, MediaDownloadRequest},
    models::ContactInfo,
    traits::ProtocolClient,
};
use wacli_store::Store;

/// Open a fresh message store inside `dir`.
pub async fn test_store(dir: &Path) -> Arc<Store> {
    Arc::new(Store::open(&dir.join("messages.db")).await.unwrap())
}

/// A downloadable image descriptor.
pub fn image_media() -> MediaDescriptor {
    MediaDescriptor {
        media_type: "image".into(),
        direct_path: "/v/t62/abc".into(),
        media_key: vec![1, 2, 3],
        mime_type: "image/jpeg".into(),
        file_length: 4,
        ..Default::default()
    }
}

/// How [`FakeClient::fetch_media`] behaves.
#[derive(Clone)]
pub enum FetchBehavior {
    Bytes(Vec<u8>),
    /// Write some bytes, then fail with a protocol error.
    PartialThenFail(Vec<u8>, Option<u16>),
}

/// Scriptable [`ProtocolClient`].
pub struct FakeClient {
    pub authenticated: AtomicBool,
    pub auth_calls: AtomicUsize,
    pub connect_error: Mutex<Option<String>>,
    pub send_error: Mutex<Option<String>>,
    pub sent: Mutex<Vec<(String, String)>>,
    pub fetch: Mutex<FetchBehavior>,
    pub fetch_calls: AtomicUsize,
    pub contacts: Mutex<HashMap<String, ContactInfo>>,
    pub groups: Mutex<HashMap<String, String>>,
    pub sync_rx: Mutex<Option<mpsc::Receiver<SyncEvent>>>,
    pub disconnects: AtomicUsize,
}

impl Default for FakeClient {
    fn default() -> Self {
        Self {
            authenticated: AtomicBool::new(false),
            auth_calls: AtomicUsize::new(0),
            connect_error: Mutex::new(None),
            send_error: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            fetch: Mutex::new(FetchBehavior::Bytes(b"data".to_vec())),
            fetch_calls: AtomicUsize::new(0),
            contacts: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
            sync_rx: Mutex::new(None),
            disconnects: AtomicUsize::new(0),
        }
    }
}

impl FakeClient {
    /// A fake whose event stream is fed through the returned sender.
    pub fn with_events(capacity: usize) -> (Self, mpsc::Sender<SyncEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let client = Self::default();
        *client.sync_rx.lock().unwrap() = Some(rx);
        (client, tx)
    }
}

#[async_trait]
impl ProtocolClient for FakeClient {
    async fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn authenticate(&self) -> Result<(), WacliError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.connect().await?;
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self) -> Result<(), WacliError> {
        match self.connect_error.lock().unwrap().clone() {
            Some(msg) => Err(WacliError::protocol(msg)),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn send_message(&self, recipient: &str, text: &str) -> Result<String, WacliError> {
        if let Some(msg) = self.send_error.lock().unwrap().clone() {
            return Err(WacliError::protocol(msg));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((recipient.to_string(), text.to_string()));
        Ok(format!("SENT{}", sent.len()))
    }

    async fn lookup_contact(&self, jid: &str) -> Option<ContactInfo> {
        self.contacts.lock().unwrap().get(jid).cloned()
    }

    async fn lookup_group_name(&self, jid: &str) -> Option<String> {
        self.groups.lock().unwrap().get(jid).cloned()
    }

    async fn fetch_media(
        &self,
        _request: &MediaDownloadRequest,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, WacliError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.fetch.lock().unwrap().clone();
        match behavior {
            FetchBehavior::Bytes(bytes) => {
                sink.write_all(&bytes).await?;
                Ok(bytes.len() as u64)
            }
            FetchBehavior::PartialThenFail(bytes, status) => {
                sink.write_all(&bytes).await?;
                sink.flush().await?;
                Err(WacliError::Protocol {
                    message: "media server error".into(),
                    status,
                })
            }
        }
    }

    async fn start_sync(&self) -> Result<mpsc::Receiver<SyncEvent>, WacliError> {
        self.connect().await?;
        self.sync_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| WacliError::protocol("event stream already taken"))
    }
}
