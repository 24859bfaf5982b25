//! WhatsApp protocol adapter for wacli.
//!
//! The real transport is compiled in with the `transport` feature. Without
//! it, [`open_client`] returns a client that can still report pairing state
//! from the session database but refuses network operations.

#[cfg(feature = "transport")]
mod client;
pub mod qr;
pub mod session;
mod unavailable;

use session::SessionStore;
use std::sync::Arc;
use wacli_core::{config::StoreConfig, error::WacliError, traits::ProtocolClient};

#[cfg(feature = "transport")]
pub use client::WhatsAppClient;
pub use unavailable::UnavailableClient;

/// Open the session database under the store directory and build a client.
pub async fn open_client(config: &StoreConfig) -> Result<Arc<dyn ProtocolClient>, WacliError> {
    let session = SessionStore::open(&config.session_db_path()).await?;

    #[cfg(feature = "transport")]
    let client: Arc<dyn ProtocolClient> = Arc::new(WhatsAppClient::new(session));
    #[cfg(not(feature = "transport"))]
    let client: Arc<dyn ProtocolClient> = Arc::new(UnavailableClient::new(Some(session)));

    Ok(client)
}
