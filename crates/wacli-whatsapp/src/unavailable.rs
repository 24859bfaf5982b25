//! Protocol client used when the WhatsApp transport is compiled out.
//!
//! Store-backed commands keep working; anything that needs the network
//! fails with a protocol error naming the missing feature.

use crate::session::SessionStore;
use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::debug;
use wacli_core::{
    error::WacliError, event::SyncEvent, media::MediaDownloadRequest, models::ContactInfo,
    traits::ProtocolClient,
};

const MISSING_TRANSPORT: &str =
    "wacli was built without the WhatsApp transport; rebuild with `--features whatsapp`";

/// A [`ProtocolClient`] that can only answer from the session database.
pub struct UnavailableClient {
    session: Option<SessionStore>,
}

impl UnavailableClient {
    pub fn new(session: Option<SessionStore>) -> Self {
        Self { session }
    }

    fn unavailable<T>(&self) -> Result<T, WacliError> {
        Err(WacliError::protocol(MISSING_TRANSPORT))
    }
}

#[async_trait]
impl ProtocolClient for UnavailableClient {
    async fn is_authenticated(&self) -> bool {
        match &self.session {
            Some(session) => match session.is_paired().await {
                Ok(paired) => paired,
                Err(e) => {
                    debug!("session lookup failed: {e}");
                    false
                }
            },
            None => false,
        }
    }

    async fn authenticate(&self) -> Result<(), WacliError> {
        self.unavailable()
    }

    async fn connect(&self) -> Result<(), WacliError> {
        self.unavailable()
    }

    async fn disconnect(&self) {}

    async fn send_message(&self, _recipient: &str, _text: &str) -> Result<String, WacliError> {
        self.unavailable()
    }

    /// Names learned by earlier sync runs.
    async fn lookup_contact(&self, jid: &str) -> Option<ContactInfo> {
        let push_name = self.session.as_ref()?.contact_name(jid).await.ok()??;
        Some(ContactInfo {
            push_name,
            ..Default::default()
        })
    }

    async fn lookup_group_name(&self, jid: &str) -> Option<String> {
        self.session.as_ref()?.group_name(jid).await.ok()?
    }

    async fn fetch_media(
        &self,
        _request: &MediaDownloadRequest,
        _sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, WacliError> {
        self.unavailable()
    }

    async fn start_sync(&self) -> Result<mpsc::Receiver<SyncEvent>, WacliError> {
        self.unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_network_operations_fail_with_protocol_error() {
        let client = UnavailableClient::new(None);
        assert!(!client.is_authenticated().await);

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, WacliError::Protocol { .. }));
        assert!(err.to_string().contains("--features whatsapp"));
        assert!(client.send_message("1", "hi").await.is_err());
        assert!(client.start_sync().await.is_err());

        let mut sink = Vec::new();
        let req = MediaDownloadRequest::default();
        assert!(client.fetch_media(&req, &mut sink).await.is_err());
    }

    #[tokio::test]
    async fn test_reports_existing_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::open(&dir.path().join("whatsapp.db"))
            .await
            .unwrap();
        session.mark_paired().await.unwrap();

        let client = UnavailableClient::new(Some(session));
        assert!(client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_names_come_from_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::open(&dir.path().join("whatsapp.db"))
            .await
            .unwrap();
        session
            .remember_contact_name("1@s.whatsapp.net", "Bob")
            .await
            .unwrap();
        session.remember_group_name("9@g.us", "Family").await.unwrap();

        let client = UnavailableClient::new(Some(session));
        assert_eq!(
            client.resolve_chat_name("1@s.whatsapp.net", Some("Robert")).await,
            "Bob"
        );
        assert_eq!(
            client.resolve_chat_name("9@g.us", Some("Carol")).await,
            "Family"
        );
    }

    #[tokio::test]
    async fn test_chat_name_falls_back_without_lookups() {
        let client = UnavailableClient::new(None);
        assert_eq!(
            client.resolve_chat_name("1@s.whatsapp.net", Some("Ali")).await,
            "Ali"
        );
        assert_eq!(
            client.resolve_chat_name("1@s.whatsapp.net", Some("-")).await,
            "1@s.whatsapp.net"
        );
        assert_eq!(client.resolve_chat_name("9@g.us", None).await, "9@g.us");
        // A group is never named after whoever posted in it.
        assert_eq!(client.resolve_chat_name("9@g.us", Some("Carol")).await, "9@g.us");
    }
}
