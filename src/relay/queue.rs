use super::progress::{BatchObserver, BatchStage};
use super::{PendingUpload, RelaySummary};
use crate::config::Settings;
use crate::destination::{UploadError, UploadReceipt, Uploader};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Unbounded FIFO of staged files.
///
/// The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct RelayQueue {
    items: Mutex<VecDeque<PendingUpload>>,
}

impl RelayQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file to the back of the queue
    pub fn enqueue(&self, item: PendingUpload) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
    }

    /// Take the oldest file, if any
    pub fn dequeue(&self) -> Option<PendingUpload> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Number of queued files
    #[must_use]
    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Timing of the relay worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Pause after every upload attempt, before the next one starts
    pub upload_delay: Duration,
    /// Poll interval while the queue is empty
    pub idle_interval: Duration,
}

impl Pacing {
    /// Pacing configured for the selected destination
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            upload_delay: settings.upload_delay(),
            idle_interval: settings.idle_interval(),
        }
    }
}

/// Result of removing an uploaded file from the staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    /// File removed
    Removed,
    /// Removal failed; the upload still counts as successful
    Failed(String),
}

/// One upload attempt made by the worker
#[derive(Debug)]
pub struct RelayAttempt {
    /// File that was attempted
    pub item: PendingUpload,
    /// Destination response
    pub outcome: Result<UploadReceipt, UploadError>,
    /// Local cleanup, only performed after a successful upload
    pub cleanup: Option<Cleanup>,
}

impl RelayAttempt {
    /// True when the destination accepted the file
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// The single consumer of a [`RelayQueue`]
#[derive(Clone)]
pub struct RelayWorker {
    queue: Arc<RelayQueue>,
    uploader: Arc<dyn Uploader>,
    pacing: Pacing,
}

impl RelayWorker {
    /// Create a worker draining `queue` into `uploader`
    #[must_use]
    pub fn new(queue: Arc<RelayQueue>, uploader: Arc<dyn Uploader>, pacing: Pacing) -> Self {
        Self {
            queue,
            uploader,
            pacing,
        }
    }

    /// Queue consumed by this worker
    #[must_use]
    pub const fn queue(&self) -> &Arc<RelayQueue> {
        &self.queue
    }

    /// Upload the oldest queued file, if any, without pausing afterwards.
    pub async fn process_next(&self) -> Option<RelayAttempt> {
        let item = self.queue.dequeue()?;
        Some(self.relay(item).await)
    }

    /// Drain the queue forever.
    ///
    /// Every attempt, successful or not, is followed by the upload delay; an
    /// empty queue is polled again after the idle interval.
    pub async fn run(self) {
        info!(
            destination = self.uploader.name(),
            delay_secs = self.pacing.upload_delay.as_secs(),
            "Relay worker started"
        );
        loop {
            if self.process_next().await.is_some() {
                tokio::time::sleep(self.pacing.upload_delay).await;
            } else {
                tokio::time::sleep(self.pacing.idle_interval).await;
            }
        }
    }

    /// Upload everything currently queued and return the tally.
    ///
    /// Consecutive attempts are separated by the upload delay; no pause
    /// follows the last one.
    pub async fn drain(&self, observer: &dyn BatchObserver) -> RelaySummary {
        let total = self.queue.len();
        let mut summary = RelaySummary::new(total);
        let mut current = 0;

        while let Some(item) = self.queue.dequeue() {
            if current > 0 {
                tokio::time::sleep(self.pacing.upload_delay).await;
            }
            current += 1;
            observer
                .stage(BatchStage::Uploading {
                    current,
                    total,
                    file: item.file_name(),
                })
                .await;

            let attempt = self.relay(item).await;
            summary.record(&attempt);
        }

        summary
    }

    async fn relay(&self, item: PendingUpload) -> RelayAttempt {
        let file = item.file_name();
        info!(file = %file, destination = self.uploader.name(), "Uploading");

        let outcome = self.uploader.upload(&item.path).await;
        let cleanup = match &outcome {
            Ok(receipt) => {
                info!(
                    file = %file,
                    remote_id = %receipt.remote_id,
                    link = receipt.link.as_deref().unwrap_or("-"),
                    "Uploaded"
                );
                Some(remove_staged(&item.path).await)
            }
            Err(e) => {
                error!(file = %file, error = %e, "Upload failed, file kept for manual recovery");
                None
            }
        };

        RelayAttempt {
            item,
            outcome,
            cleanup,
        }
    }
}

async fn remove_staged(path: &Path) -> Cleanup {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed uploaded file");
            Cleanup::Removed
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove uploaded file");
            Cleanup::Failed(e.to_string())
        }
    }
}
