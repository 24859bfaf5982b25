//! Media fetch: rebuild the protocol message from stored key material and
//! let the client download and decrypt it.

use wacli_core::error::WacliError;
use wacli_core::media::{MediaDownloadRequest, MediaKind};
use waproto::whatsapp::message::{
    AudioMessage, DocumentMessage, ImageMessage, StickerMessage, VideoMessage,
};
use whatsapp_rust::client::Client;

/// Build a downloadable message of type `$ty` carrying the request's media fields.
macro_rules! media_message {
    ($ty:ident, $req:expr) => {
        $ty {
            url: Some($req.url.clone()).filter(|u| !u.is_empty()),
            direct_path: Some($req.direct_path.clone()),
            media_key: Some($req.media_key.clone()),
            file_sha256: Some($req.file_sha256.clone()).filter(|h| !h.is_empty()),
            file_enc_sha256: Some($req.file_enc_sha256.clone()).filter(|h| !h.is_empty()),
            file_length: Some($req.file_length).filter(|n| *n > 0),
            mimetype: Some($req.mime_type.clone()).filter(|t| !t.is_empty()),
            ..Default::default()
        }
    };
}

/// Download and decrypt the media a stored message points at.
///
/// Not retried: expired media fails the same way every time.
pub(super) async fn download(
    client: &Client,
    request: &MediaDownloadRequest,
) -> Result<Vec<u8>, WacliError> {
    let kind = MediaKind::parse(&request.media_type).ok_or_else(|| {
        WacliError::Validation(format!("unsupported media type: {}", request.media_type))
    })?;

    let result = match kind {
        MediaKind::Image => client.download(&media_message!(ImageMessage, request)).await,
        MediaKind::Video => client.download(&media_message!(VideoMessage, request)).await,
        MediaKind::Audio => client.download(&media_message!(AudioMessage, request)).await,
        MediaKind::Document => {
            client
                .download(&media_message!(DocumentMessage, request))
                .await
        }
        MediaKind::Sticker => {
            client
                .download(&media_message!(StickerMessage, request))
                .await
        }
    };

    result.map_err(|e| WacliError::protocol_from_text(format!("media download failed: {e}")))
}
