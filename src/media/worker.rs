//! Download Worker Pool.
//!
//! A fixed number of workers drain a bounded job queue so that slow or
//! failing media fetches never stall event ingestion. Enqueueing never
//! blocks the caller: when the queue is full the send is retried from a
//! detached task, bounded by a timeout and abandoned on shutdown.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use wacli_core::{config::MediaConfig, error::WacliError, models::MessageKey};

/// Failure messages kept for the end-of-run summary.
const MAX_ERROR_SAMPLES: usize = 5;

/// "Fetch this message's media."
pub type MediaJob = MessageKey;

/// What a processed job amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Downloaded,
    /// Already downloaded, gone, or lacking the metadata to fetch.
    Skipped,
}

/// Executes one media job.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &MediaJob) -> Result<JobOutcome, WacliError>;
}

/// What happened to an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueStatus {
    /// Placed on the queue.
    Queued,
    /// Queue was full; a detached task keeps trying.
    Deferred,
    /// Pool is shutting down; the job is lost until a later re-scan.
    Dropped,
}

/// Counters reported when the pool stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaStats {
    pub downloaded: u64,
    pub skipped: u64,
    /// 403/404/410 from the media server: normal for old messages.
    pub expired: u64,
    pub failed: u64,
    pub dropped: u64,
    /// First few non-expiry failure messages.
    pub errors: Vec<String>,
}

impl MediaStats {
    fn record(&mut self, result: Result<JobOutcome, WacliError>) {
        match result {
            Ok(JobOutcome::Downloaded) => self.downloaded += 1,
            Ok(JobOutcome::Skipped) => self.skipped += 1,
            Err(e) if e.is_expired_media() => self.expired += 1,
            Err(e) => {
                self.failed += 1;
                if self.errors.len() < MAX_ERROR_SAMPLES {
                    self.errors.push(e.to_string());
                }
            }
        }
    }

    fn log_summary(&self) {
        if self.expired > 0 {
            info!(
                "skipped {} expired/deleted media files (normal for old messages)",
                self.expired
            );
        }
        if self.failed > 0 {
            warn!("{} media downloads failed", self.failed);
            for msg in &self.errors {
                warn!("  - {msg}");
            }
            let unsampled = self.failed.saturating_sub(self.errors.len() as u64);
            if unsampled > 0 {
                warn!("  ... and {unsampled} more");
            }
        }
        if self.dropped > 0 {
            debug!("{} media jobs dropped under queue pressure", self.dropped);
        }
    }
}

/// Bounded pool of media download workers.
pub struct MediaWorkerPool {
    tx: mpsc::Sender<MediaJob>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    stats: Arc<StdMutex<MediaStats>>,
    enqueue_timeout: Duration,
    shutdown_grace: Duration,
}

impl MediaWorkerPool {
    /// Spawn the workers. Cancelling `parent` also stops the pool.
    pub fn start(
        processor: Arc<dyn JobProcessor>,
        config: &MediaConfig,
        parent: &CancellationToken,
    ) -> Self {
        let workers = config.effective_workers();
        let (tx, rx) = mpsc::channel(config.effective_queue_capacity());
        let rx = Arc::new(Mutex::new(rx));
        let cancel = parent.child_token();
        let tracker = TaskTracker::new();
        let stats = Arc::new(StdMutex::new(MediaStats::default()));

        for n in 0..workers {
            tracker.spawn(run_worker(
                n,
                rx.clone(),
                processor.clone(),
                cancel.clone(),
                stats.clone(),
            ));
        }
        debug!("media worker pool started with {workers} workers");

        Self {
            tx,
            cancel,
            tracker,
            stats,
            enqueue_timeout: config.enqueue_timeout(),
            shutdown_grace: config.shutdown_grace(),
        }
    }

    /// Best-effort, non-blocking enqueue.
    pub fn enqueue(&self, job: MediaJob) -> EnqueueStatus {
        if self.cancel.is_cancelled() {
            self.count_dropped();
            return EnqueueStatus::Dropped;
        }

        match self.tx.try_send(job) {
            Ok(()) => EnqueueStatus::Queued,
            Err(mpsc::error::TrySendError::Full(job)) => {
                let tx = self.tx.clone();
                let cancel = self.cancel.clone();
                let stats = self.stats.clone();
                let timeout = self.enqueue_timeout;
                self.tracker.spawn(async move {
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => false,
                        res = tokio::time::timeout(timeout, tx.send(job)) => {
                            matches!(res, Ok(Ok(())))
                        }
                    };
                    if !sent {
                        if let Ok(mut s) = stats.lock() {
                            s.dropped += 1;
                        }
                    }
                });
                EnqueueStatus::Deferred
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.count_dropped();
                EnqueueStatus::Dropped
            }
        }
    }

    fn count_dropped(&self) {
        if let Ok(mut s) = self.stats.lock() {
            s.dropped += 1;
        }
    }

    /// Current counters.
    pub fn stats(&self) -> MediaStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Stop accepting work, give in-flight jobs a bounded wait, and report.
    ///
    /// Jobs still queued are abandoned; a later re-scan picks them up.
    pub async fn shutdown(self) -> MediaStats {
        self.cancel.cancel();
        self.tracker.close();
        if tokio::time::timeout(self.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "media workers still busy after {:?}; abandoning in-flight downloads",
                self.shutdown_grace
            );
        }
        let stats = self.stats();
        stats.log_summary();
        stats
    }
}

async fn run_worker(
    n: usize,
    rx: Arc<Mutex<mpsc::Receiver<MediaJob>>>,
    processor: Arc<dyn JobProcessor>,
    cancel: CancellationToken,
    stats: Arc<StdMutex<MediaStats>>,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = rx.recv() => job,
            }
        };
        let Some(job) = job else { break };

        // Dropping the in-flight future on cancel also drops its temp file.
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = processor.process(&job) => result,
        };
        if let Err(e) = &result {
            debug!("media job {}/{} failed: {e}", job.chat_jid, job.id);
        }
        if let Ok(mut s) = stats.lock() {
            s.record(result);
        }
    }
    debug!("media worker {n} stopped");
}
