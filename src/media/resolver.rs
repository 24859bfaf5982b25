//! Media Resolver: message metadata to bytes on disk.
//!
//! Paths are deterministic (`{store}/media/{chat}/{id}/{type}/{filename}`)
//! and every segment is sanitized. Downloads land in a temp file next to the
//! target and are renamed into place only on success, so an interrupted
//! fetch never leaves a partial file at the final path.

use super::worker::{JobOutcome, JobProcessor, MediaJob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use wacli_core::{
    error::WacliError,
    media::{MediaDownloadRequest, MediaKind},
    models::MessageDownloadInfo,
    traits::{MessageStore, ProtocolClient},
};

/// Leaves room for the directory part; most filesystems allow 255.
const MAX_FILENAME_LEN: usize = 200;

/// Extensions longer than this are not worth preserving on truncation.
const MAX_PRESERVED_EXT_LEN: usize = 20;

/// Characters that are unsafe in a path segment on some platform.
const RESERVED_CHARS: [char; 9] = ['/', '\\', ':', '@', '?', '*', '<', '>', '|'];

/// Canonical extensions for mime types WhatsApp commonly reports.
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", ".jpg"),
    ("image/jpg", ".jpg"),
    ("image/pjpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("image/heic", ".heic"),
    ("video/mp4", ".mp4"),
    ("video/3gpp", ".3gp"),
    ("video/quicktime", ".mov"),
    ("video/webm", ".webm"),
    ("audio/ogg", ".ogg"),
    ("audio/opus", ".opus"),
    ("audio/mpeg", ".mp3"),
    ("audio/mp4", ".m4a"),
    ("audio/aac", ".aac"),
    ("audio/amr", ".amr"),
    ("audio/wav", ".wav"),
    ("application/pdf", ".pdf"),
    ("application/zip", ".zip"),
    ("application/msword", ".doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
    ),
    ("application/vnd.ms-excel", ".xls"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".xlsx",
    ),
    ("application/vnd.ms-powerpoint", ".ppt"),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".pptx",
    ),
    ("text/plain", ".txt"),
    ("text/csv", ".csv"),
    ("application/json", ".json"),
];

fn replace_reserved(s: &str) -> String {
    s.chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect::<String>()
        .replace("..", "_")
}

/// Sanitize one directory segment. Blank becomes `unknown`.
pub fn sanitize_segment(segment: &str) -> String {
    let segment = segment.trim();
    if segment.is_empty() {
        return "unknown".to_string();
    }
    replace_reserved(segment)
}

/// Sanitize a filename and cap its length, keeping a short extension.
pub fn sanitize_filename(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return "file".to_string();
    }
    let name = replace_reserved(name);
    if name.len() <= MAX_FILENAME_LEN {
        return name;
    }

    let ext = name.rfind('.').map(|i| &name[i..]).unwrap_or("");
    if !ext.is_empty() && ext.len() < MAX_PRESERVED_EXT_LEN {
        let base = truncate_at_boundary(&name, MAX_FILENAME_LEN - ext.len());
        format!("{base}{ext}")
    } else {
        truncate_at_boundary(&name, MAX_FILENAME_LEN).to_string()
    }
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char boundary.
fn truncate_at_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Canonical extension (with leading dot) for a mime type, if known.
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if essence.is_empty() {
        return None;
    }
    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
}

/// Unsanitized filename for a message's media.
///
/// Stored filename, else `{id}{mime extension}`, else `{id}{type default}`,
/// else the bare ID.
pub fn filename_for(info: &MessageDownloadInfo) -> String {
    let stored = info.media.filename.trim();
    if !stored.is_empty() {
        return stored.to_string();
    }
    if let Some(ext) = extension_for_mime(&info.media.mime_type) {
        return format!("{}{ext}", info.id);
    }
    match MediaKind::parse(&info.media.media_type) {
        Some(kind) => format!("{}{}", info.id, kind.default_extension()),
        None => info.id.clone(),
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

/// Where a message's media should be written.
///
/// An explicit `requested` path is used as given unless it names an existing
/// directory or ends in a separator, in which case the derived filename is
/// appended.
pub fn resolve_output_path(
    store_root: &Path,
    info: &MessageDownloadInfo,
    requested: Option<&str>,
) -> PathBuf {
    let filename = sanitize_filename(&filename_for(info));

    if let Some(requested) = requested.filter(|r| !r.trim().is_empty()) {
        let path = absolutize(PathBuf::from(requested));
        if requested.ends_with('/') || requested.ends_with(MAIN_SEPARATOR) || path.is_dir() {
            return path.join(filename);
        }
        return path;
    }

    let mut dir = store_root
        .join("media")
        .join(sanitize_segment(&info.chat_jid))
        .join(sanitize_segment(&info.id));
    if !info.media.media_type.trim().is_empty() {
        dir = dir.join(sanitize_segment(&info.media.media_type));
    }
    absolutize(dir).join(filename)
}

/// Result of one successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub bytes: u64,
    pub downloaded_at: DateTime<Utc>,
}

/// Downloads media through the protocol client and records completion in the store.
pub struct MediaResolver {
    store: Arc<dyn MessageStore>,
    client: Arc<dyn ProtocolClient>,
    store_root: PathBuf,
}

impl MediaResolver {
    pub fn new(
        store: Arc<dyn MessageStore>,
        client: Arc<dyn ProtocolClient>,
        store_root: PathBuf,
    ) -> Self {
        Self {
            store,
            client,
            store_root,
        }
    }

    pub fn output_path(&self, info: &MessageDownloadInfo, requested: Option<&str>) -> PathBuf {
        resolve_output_path(&self.store_root, info, requested)
    }

    /// Fetch into a temp file beside `target`, then rename into place.
    pub async fn download(
        &self,
        request: &MediaDownloadRequest,
        target: &Path,
    ) -> Result<u64, WacliError> {
        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(dir).await?;

        let temp = tempfile::Builder::new()
            .prefix(".wacli-")
            .suffix(".part")
            .tempfile_in(dir)?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);

        // On any error below, dropping `temp` removes the partial file.
        let bytes = self.client.fetch_media(request, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        temp.persist(target).map_err(|e| WacliError::Io(e.error))?;
        debug!("media written to {} ({bytes} bytes)", target.display());
        Ok(bytes)
    }

    /// Resolve the path, download, and mark the message downloaded.
    ///
    /// Messages without a media type, direct path, and media key are rejected
    /// before any fetch.
    pub async fn download_and_record(
        &self,
        info: &MessageDownloadInfo,
        requested: Option<&str>,
    ) -> Result<DownloadedMedia, WacliError> {
        if !info.is_downloadable() {
            return Err(WacliError::NoDownloadableMedia(info.id.clone()));
        }

        let path = self.output_path(info, requested);
        let request = MediaDownloadRequest::from(info);
        let bytes = self.download(&request, &path).await?;

        let downloaded_at = Utc::now();
        self.store
            .mark_media_downloaded(
                &info.id,
                &info.chat_jid,
                &path.to_string_lossy(),
                downloaded_at,
            )
            .await
            .map_err(|e| match e {
                WacliError::Storage(msg) => {
                    WacliError::Storage(format!("failed to mark media downloaded: {msg}"))
                }
                other => other,
            })?;

        Ok(DownloadedMedia {
            path,
            bytes,
            downloaded_at,
        })
    }
}

#[async_trait]
impl JobProcessor for MediaResolver {
    async fn process(&self, job: &MediaJob) -> Result<JobOutcome, WacliError> {
        // Re-read: the row may have changed since the job was queued.
        let info = match self
            .store
            .get_message_for_download(&job.id, Some(&job.chat_jid))
            .await
        {
            Ok(info) => info,
            Err(e) if e.is_not_found() => return Ok(JobOutcome::Skipped),
            Err(e) => return Err(e),
        };

        if !info.is_downloadable() {
            return Ok(JobOutcome::Skipped);
        }
        if let Some(local) = info.local_path.as_deref() {
            if tokio::fs::metadata(local).await.is_ok() {
                return Ok(JobOutcome::Skipped);
            }
        }

        let done = self.download_and_record(&info, None).await?;
        info!(
            "downloaded {} media for {} ({} bytes)",
            info.media.media_type, info.id, done.bytes
        );
        Ok(JobOutcome::Downloaded)
    }
}
