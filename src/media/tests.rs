use super::resolver::{
    extension_for_mime, filename_for, resolve_output_path, sanitize_filename, sanitize_segment,
};
use super::*;
use crate::testing::{image_media, test_store, FakeClient, FetchBehavior};
use chrono::{TimeZone, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wacli_core::{
    config::MediaConfig,
    error::WacliError,
    media::MediaDescriptor,
    models::{MessageDownloadInfo, MessageKey, MessageRecord},
    traits::MessageStore,
};

fn info(id: &str, chat: &str, media: MediaDescriptor) -> MessageDownloadInfo {
    MessageDownloadInfo {
        id: id.into(),
        chat_jid: chat.into(),
        chat_name: None,
        sender: "1".into(),
        content: String::new(),
        message_time: Utc.timestamp_opt(100, 0).unwrap(),
        is_from_me: false,
        media,
        local_path: None,
        downloaded_at: None,
    }
}

// --- path resolution ---

#[test]
fn test_sanitize_segment() {
    assert_eq!(sanitize_segment("123@s.whatsapp.net"), "123_s.whatsapp.net");
    assert_eq!(sanitize_segment("../../etc"), "____etc");
    assert_eq!(sanitize_segment("  "), "unknown");
    assert_eq!(sanitize_segment(r"a\b:c*d?e<f>g|h"), "a_b_c_d_e_f_g_h");
}

#[test]
fn test_sanitize_filename() {
    assert_eq!(sanitize_filename(""), "file");
    assert_eq!(sanitize_filename("../secret.txt"), "__secret.txt");
    assert_eq!(sanitize_filename(" report.pdf "), "report.pdf");
}

#[test]
fn test_sanitize_filename_truncates_keeping_extension() {
    let long = format!("{}.jpeg", "x".repeat(300));
    let name = sanitize_filename(&long);
    assert_eq!(name.len(), 200);
    assert!(name.ends_with(".jpeg"));

    let no_ext = "y".repeat(300);
    assert_eq!(sanitize_filename(&no_ext).len(), 200);

    // Multi-byte characters are never split.
    let wide = format!("{}.png", "é".repeat(150));
    let name = sanitize_filename(&wide);
    assert!(name.len() <= 200);
    assert!(name.ends_with(".png"));
}

#[test]
fn test_extension_for_mime() {
    assert_eq!(extension_for_mime("image/jpeg"), Some(".jpg"));
    assert_eq!(extension_for_mime("IMAGE/PNG"), Some(".png"));
    assert_eq!(extension_for_mime("audio/ogg; codecs=opus"), Some(".ogg"));
    assert_eq!(extension_for_mime("application/x-unknown"), None);
    assert_eq!(extension_for_mime(""), None);
}

#[test]
fn test_filename_precedence() {
    let mut media = image_media();
    media.filename = "holiday.png".into();
    assert_eq!(filename_for(&info("m1", "c", media)), "holiday.png");

    assert_eq!(filename_for(&info("m1", "c", image_media())), "m1.jpg");

    let mut media = image_media();
    media.mime_type = String::new();
    media.media_type = "video".into();
    assert_eq!(filename_for(&info("m1", "c", media)), "m1.mp4");

    let mut media = image_media();
    media.mime_type = String::new();
    media.media_type = "document".into();
    assert_eq!(filename_for(&info("m1", "c", media)), "m1");

    let mut media = image_media();
    media.mime_type = String::new();
    media.media_type = "sticker".into();
    assert_eq!(filename_for(&info("m1", "c", media)), "m1.webp");
}

#[test]
fn test_default_output_path_layout() {
    let root = Path::new("/data/store");
    let path = resolve_output_path(root, &info("ABC", "1@s.whatsapp.net", image_media()), None);
    assert_eq!(
        path,
        Path::new("/data/store/media/1_s.whatsapp.net/ABC/image/ABC.jpg")
    );
}

#[test]
fn test_default_output_path_neutralizes_traversal() {
    let root = Path::new("/data/store");
    let path = resolve_output_path(root, &info("../../x", "../c", image_media()), None);
    assert!(path.starts_with("/data/store/media"));
    assert!(!path.components().any(|c| c.as_os_str() == ".."));
}

#[test]
fn test_requested_path_used_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.bin");
    let requested = target.to_string_lossy().to_string();
    let path = resolve_output_path(
        Path::new("/unused"),
        &info("m1", "c", image_media()),
        Some(&requested),
    );
    assert_eq!(path, target);
}

#[test]
fn test_requested_directory_gets_filename() {
    let dir = tempfile::tempdir().unwrap();
    let requested = dir.path().to_string_lossy().to_string();
    let path = resolve_output_path(
        Path::new("/unused"),
        &info("m1", "c", image_media()),
        Some(&requested),
    );
    assert_eq!(path, dir.path().join("m1.jpg"));

    let missing = format!("{}/new/", dir.path().display());
    let path = resolve_output_path(
        Path::new("/unused"),
        &info("m1", "c", image_media()),
        Some(&missing),
    );
    assert_eq!(path, dir.path().join("new").join("m1.jpg"));
}

// --- resolver ---

async fn seeded(dir: &Path) -> Arc<wacli_store::Store> {
    let store = test_store(dir).await;
    store
        .upsert_chat("1@s.whatsapp.net", "Alice", Utc.timestamp_opt(100, 0).unwrap())
        .await
        .unwrap();
    store
        .upsert_message(&MessageRecord {
            id: "m1".into(),
            chat_jid: "1@s.whatsapp.net".into(),
            sender: "1".into(),
            content: "pic".into(),
            timestamp: Utc.timestamp_opt(100, 0).unwrap(),
            is_from_me: false,
            media: Some(image_media()),
        })
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_download_and_record_writes_and_marks() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded(dir.path()).await;
    let client = Arc::new(FakeClient::default());
    let resolver = MediaResolver::new(store.clone(), client, dir.path().to_path_buf());

    let info = store
        .get_message_for_download("m1", Some("1@s.whatsapp.net"))
        .await
        .unwrap();
    let done = resolver.download_and_record(&info, None).await.unwrap();

    assert_eq!(done.bytes, 4);
    assert_eq!(std::fs::read(&done.path).unwrap(), b"data");
    assert!(done.path.ends_with("media/1_s.whatsapp.net/m1/image/m1.jpg"));

    let after = store
        .get_message_for_download("m1", Some("1@s.whatsapp.net"))
        .await
        .unwrap();
    assert_eq!(
        after.local_path.as_deref(),
        Some(done.path.to_string_lossy().as_ref())
    );
    assert!(after.downloaded_at.is_some());
}

#[tokio::test]
async fn test_failed_fetch_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded(dir.path()).await;
    let client = Arc::new(FakeClient::default());
    *client.fetch.lock().unwrap() = FetchBehavior::PartialThenFail(b"partial".to_vec(), None);
    let resolver = MediaResolver::new(store.clone(), client, dir.path().to_path_buf());

    let target = dir.path().join("out").join("final.jpg");
    let request = wacli_core::media::MediaDownloadRequest::from(&image_media());
    let err = resolver.download(&request, &target).await.unwrap_err();
    assert!(matches!(err, WacliError::Protocol { .. }));

    assert!(!target.exists());
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("out"))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty(), "temp file left behind");
}

#[tokio::test]
async fn test_failed_fetch_keeps_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded(dir.path()).await;
    let client = Arc::new(FakeClient::default());
    *client.fetch.lock().unwrap() = FetchBehavior::PartialThenFail(b"junk".to_vec(), Some(500));
    let resolver = MediaResolver::new(store, client, dir.path().to_path_buf());

    let target = dir.path().join("existing.jpg");
    std::fs::write(&target, b"good").unwrap();
    let request = wacli_core::media::MediaDownloadRequest::from(&image_media());
    assert!(resolver.download(&request, &target).await.is_err());
    assert_eq!(std::fs::read(&target).unwrap(), b"good");
}

#[tokio::test]
async fn test_no_downloadable_media_is_not_fetched() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded(dir.path()).await;
    let client = Arc::new(FakeClient::default());
    let resolver = MediaResolver::new(store, client.clone(), dir.path().to_path_buf());

    let mut media = image_media();
    media.direct_path = String::new();
    media.media_key = Vec::new();
    let err = resolver
        .download_and_record(&info("m2", "1@s.whatsapp.net", media), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WacliError::NoDownloadableMedia(id) if id == "m2"));
    assert_eq!(client.fetch_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_job_skips_already_downloaded() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded(dir.path()).await;
    let client = Arc::new(FakeClient::default());
    let resolver = MediaResolver::new(store, client.clone(), dir.path().to_path_buf());
    let job = MessageKey::new("m1", "1@s.whatsapp.net");

    assert_eq!(resolver.process(&job).await.unwrap(), JobOutcome::Downloaded);
    assert_eq!(resolver.process(&job).await.unwrap(), JobOutcome::Skipped);
    assert_eq!(client.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_job_redownloads_when_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded(dir.path()).await;
    let client = Arc::new(FakeClient::default());
    let resolver = MediaResolver::new(store.clone(), client.clone(), dir.path().to_path_buf());
    store
        .mark_media_downloaded("m1", "1@s.whatsapp.net", "/nonexistent/file.jpg", Utc::now())
        .await
        .unwrap();

    let job = MessageKey::new("m1", "1@s.whatsapp.net");
    assert_eq!(resolver.process(&job).await.unwrap(), JobOutcome::Downloaded);
    assert_eq!(client.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_job_for_unknown_message_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded(dir.path()).await;
    let client = Arc::new(FakeClient::default());
    let resolver = MediaResolver::new(store, client, dir.path().to_path_buf());
    let job = MessageKey::new("nope", "1@s.whatsapp.net");
    assert_eq!(resolver.process(&job).await.unwrap(), JobOutcome::Skipped);
}

// --- worker pool ---

/// Records jobs; fails those whose ID names a status, blocks on "slow".
#[derive(Default)]
struct ScriptedProcessor {
    processed: AtomicUsize,
}

#[async_trait::async_trait]
impl JobProcessor for ScriptedProcessor {
    async fn process(&self, job: &MediaJob) -> Result<JobOutcome, WacliError> {
        match job.id.as_str() {
            "slow" => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(JobOutcome::Downloaded)
            }
            "gone" => Err(WacliError::protocol("download failed: status code 410")),
            "boom" => Err(WacliError::protocol("connection reset")),
            "skip" => Ok(JobOutcome::Skipped),
            _ => {
                self.processed.fetch_add(1, Ordering::SeqCst);
                Ok(JobOutcome::Downloaded)
            }
        }
    }
}

fn media_config(workers: usize, capacity: usize) -> MediaConfig {
    MediaConfig {
        workers,
        queue_capacity: Some(capacity),
        enqueue_timeout_secs: 1,
        shutdown_grace_secs: 1,
        ..Default::default()
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_pool_classifies_outcomes() {
    let processor = Arc::new(ScriptedProcessor::default());
    let pool = MediaWorkerPool::start(
        processor.clone(),
        &media_config(2, 16),
        &CancellationToken::new(),
    );

    for id in ["a", "b", "gone", "boom", "skip"] {
        assert_eq!(pool.enqueue(MessageKey::new(id, "c")), EnqueueStatus::Queued);
    }
    wait_until(|| {
        let s = pool.stats();
        s.downloaded + s.expired + s.failed + s.skipped == 5
    })
    .await;

    let stats = pool.shutdown().await;
    assert_eq!(stats.downloaded, 2);
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.errors, vec!["protocol error: connection reset".to_string()]);
}

#[tokio::test]
async fn test_error_samples_are_capped() {
    let processor = Arc::new(ScriptedProcessor::default());
    let pool = MediaWorkerPool::start(processor, &media_config(1, 16), &CancellationToken::new());
    for _ in 0..8 {
        pool.enqueue(MessageKey::new("boom", "c"));
    }
    wait_until(|| pool.stats().failed == 8).await;
    let stats = pool.shutdown().await;
    assert_eq!(stats.errors.len(), 5);
}

#[tokio::test]
async fn test_full_queue_defers_without_blocking() {
    let processor = Arc::new(ScriptedProcessor::default());
    let pool = MediaWorkerPool::start(
        processor.clone(),
        &media_config(1, 1),
        &CancellationToken::new(),
    );

    // The single worker parks on "slow"; the next job fills the queue.
    assert_eq!(pool.enqueue(MessageKey::new("slow", "c")), EnqueueStatus::Queued);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.enqueue(MessageKey::new("a", "c")), EnqueueStatus::Queued);
    assert_eq!(pool.enqueue(MessageKey::new("b", "c")), EnqueueStatus::Deferred);

    // The deferred send cannot complete before the enqueue timeout.
    wait_until(|| pool.stats().dropped == 1).await;

    let stats = pool.shutdown().await;
    assert_eq!(processor.processed.load(Ordering::SeqCst), 0);
    assert_eq!(stats.dropped, 1);
}

#[tokio::test]
async fn test_enqueue_after_cancel_is_dropped() {
    let parent = CancellationToken::new();
    let processor = Arc::new(ScriptedProcessor::default());
    let pool = MediaWorkerPool::start(processor, &media_config(1, 4), &parent);
    parent.cancel();
    assert_eq!(pool.enqueue(MessageKey::new("a", "c")), EnqueueStatus::Dropped);
    assert_eq!(pool.shutdown().await.dropped, 1);
}

#[tokio::test]
async fn test_shutdown_abandons_in_flight_work_promptly() {
    let processor = Arc::new(ScriptedProcessor::default());
    let pool = MediaWorkerPool::start(processor, &media_config(2, 4), &CancellationToken::new());
    pool.enqueue(MessageKey::new("slow", "c"));
    pool.enqueue(MessageKey::new("slow", "c"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    let stats = pool.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(stats.downloaded, 0);
}
