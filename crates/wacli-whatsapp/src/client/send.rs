//! Outbound protocol calls with retry and backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};
use wacli_core::error::WacliError;
use wacore_binary::jid::Jid;
use whatsapp_rust::client::Client;

/// Backoff between attempts: 500ms, 1s, 2s.
pub(super) const RETRY_DELAYS_MS: [u64; 3] = [500, 1000, 2000];

/// Run `op` up to `RETRY_DELAYS_MS.len()` times, sleeping between failures.
///
/// Returns the last error's text when every attempt failed.
pub(super) async fn with_retries<T, E, F, Fut>(what: &str, mut op: F) -> Result<T, String>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = RETRY_DELAYS_MS.len();
    let mut last_err = String::new();

    for (attempt, delay_ms) in RETRY_DELAYS_MS.iter().enumerate() {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let attempt_num = attempt + 1;
                if attempt_num < attempts {
                    warn!("{what} attempt {attempt_num}/{attempts} failed: {e}, retrying in {delay_ms}ms");
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                } else {
                    error!("{what} attempt {attempt_num}/{attempts} failed: {e}, giving up");
                }
                last_err = e.to_string();
            }
        }
    }

    Err(last_err)
}

/// Send a message, returning the server-assigned message ID.
pub(super) async fn retry_send(
    client: &Client,
    jid: &Jid,
    msg: waproto::whatsapp::Message,
) -> Result<String, WacliError> {
    with_retries("whatsapp send", || client.send_message(jid.clone(), msg.clone()))
        .await
        .map_err(|e| {
            WacliError::protocol_from_text(format!(
                "whatsapp send failed after {} attempts: {e}",
                RETRY_DELAYS_MS.len()
            ))
        })
}
