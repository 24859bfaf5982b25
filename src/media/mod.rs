//! Media download: path resolution, atomic writes, and the background worker pool.

pub mod resolver;
pub mod worker;

#[cfg(test)]
mod tests;

pub use resolver::{DownloadedMedia, MediaResolver};
pub use worker::{EnqueueStatus, JobOutcome, JobProcessor, MediaJob, MediaStats, MediaWorkerPool};
