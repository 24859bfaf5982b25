//! Media descriptors and the download request handed to the protocol layer.

use crate::models::MessageDownloadInfo;
use serde::{Deserialize, Serialize};

/// Media metadata attached to a message.
///
/// Every field is optional in practice: an empty string / empty vec / zero
/// means "not observed". A descriptor with nothing populated is a text-only
/// message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub media_type: String,
    pub filename: String,
    pub url: String,
    pub direct_path: String,
    pub mime_type: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

impl MediaDescriptor {
    /// Whether enough metadata is present to attempt a fetch.
    pub fn is_downloadable(&self) -> bool {
        has_downloadable_media(&self.media_type, &self.direct_path, &self.media_key)
    }

    /// Whether no field carries any information.
    pub fn is_empty(&self) -> bool {
        self.media_type.trim().is_empty()
            && self.filename.trim().is_empty()
            && self.url.is_empty()
            && self.direct_path.trim().is_empty()
            && self.mime_type.trim().is_empty()
            && self.media_key.is_empty()
            && self.file_sha256.is_empty()
            && self.file_enc_sha256.is_empty()
            && self.file_length == 0
    }
}

/// The download gate: media type, direct path, and media key must all be present.
pub fn has_downloadable_media(media_type: &str, direct_path: &str, media_key: &[u8]) -> bool {
    !media_type.trim().is_empty() && !direct_path.trim().is_empty() && !media_key.is_empty()
}

/// Media kinds the protocol layer knows how to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MediaKind {
    /// Parse a stored media type (case-insensitive).
    pub fn parse(media_type: &str) -> Option<Self> {
        match media_type.trim().to_ascii_lowercase().as_str() {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "document" => Some(Self::Document),
            "sticker" => Some(Self::Sticker),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Sticker => "sticker",
        }
    }

    /// Extension used when neither a filename nor a known mime type is stored.
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Image => ".jpg",
            Self::Video => ".mp4",
            Self::Audio => ".ogg",
            Self::Sticker => ".webp",
            Self::Document => "",
        }
    }
}

/// Exactly what the protocol layer needs to fetch and decrypt one media blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDownloadRequest {
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
    pub media_type: String,
    pub mime_type: String,
}

impl From<&MediaDescriptor> for MediaDownloadRequest {
    fn from(media: &MediaDescriptor) -> Self {
        Self {
            url: media.url.clone(),
            direct_path: media.direct_path.clone(),
            media_key: media.media_key.clone(),
            file_sha256: media.file_sha256.clone(),
            file_enc_sha256: media.file_enc_sha256.clone(),
            file_length: media.file_length,
            media_type: media.media_type.clone(),
            mime_type: media.mime_type.clone(),
        }
    }
}

impl From<&MessageDownloadInfo> for MediaDownloadRequest {
    fn from(info: &MessageDownloadInfo) -> Self {
        Self::from(&info.media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> MediaDescriptor {
        MediaDescriptor {
            media_type: "image".into(),
            direct_path: "/p".into(),
            media_key: vec![1, 2, 3],
            ..Default::default()
        }
    }

    #[test]
    fn test_download_gate_requires_all_three_fields() {
        assert!(image().is_downloadable());

        let mut no_type = image();
        no_type.media_type = "  ".into();
        assert!(!no_type.is_downloadable());

        let mut no_path = image();
        no_path.direct_path.clear();
        assert!(!no_path.is_downloadable());

        let mut no_key = image();
        no_key.media_key.clear();
        assert!(!no_key.is_downloadable());
    }

    #[test]
    fn test_empty_descriptor_is_text_only() {
        let media = MediaDescriptor::default();
        assert!(media.is_empty());
        assert!(!media.is_downloadable());
        assert!(!image().is_empty());
    }

    #[test]
    fn test_media_kind_parse() {
        assert_eq!(MediaKind::parse("IMAGE"), Some(MediaKind::Image));
        assert_eq!(MediaKind::parse(" document "), Some(MediaKind::Document));
        assert_eq!(MediaKind::parse("text"), None);
        assert_eq!(MediaKind::Audio.default_extension(), ".ogg");
        assert_eq!(MediaKind::Document.default_extension(), "");
    }

    #[test]
    fn test_request_carries_key_material() {
        let mut media = image();
        media.file_sha256 = vec![4, 5, 6];
        media.file_enc_sha256 = vec![7, 8, 9];
        media.file_length = 1024;
        let req = MediaDownloadRequest::from(&media);
        assert_eq!(req.direct_path, "/p");
        assert_eq!(req.media_key, vec![1, 2, 3]);
        assert_eq!(req.file_sha256, vec![4, 5, 6]);
        assert_eq!(req.file_enc_sha256, vec![7, 8, 9]);
        assert_eq!(req.file_length, 1024);
    }
}
