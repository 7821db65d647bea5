use super::progress::{BatchObserver, BatchStage};
use super::queue::{Pacing, RelayQueue, RelayWorker};
use super::renamer::rename_batch;
use super::{PendingUpload, RelayError, RelaySummary};
use crate::destination::Uploader;
use crate::source::fetcher::fetch_videos;
use crate::source::{ChannelRef, SourceSession};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// One `/relay` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayJob {
    /// Channel whose history is relayed
    pub channel: ChannelRef,
    /// Maximum number of videos, oldest first
    pub count: usize,
    /// Telegram user who asked for the run
    pub invoker: i64,
}

/// How a batch run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReport {
    /// The channel history holds no videos
    NoVideos,
    /// Videos were found and relayed (some may have failed)
    Completed(RelaySummary),
}

/// Fetch → rename → drain, inside one command's lifetime
pub struct BatchRelay {
    source: Arc<dyn SourceSession>,
    uploader: Arc<dyn Uploader>,
    pacing: Pacing,
    base_name: String,
    staging_root: PathBuf,
}

impl BatchRelay {
    /// Create a batch relay writing its runs below `staging_root`
    #[must_use]
    pub fn new(
        source: Arc<dyn SourceSession>,
        uploader: Arc<dyn Uploader>,
        pacing: Pacing,
        base_name: String,
        staging_root: PathBuf,
    ) -> Self {
        Self {
            source,
            uploader,
            pacing,
            base_name,
            staging_root,
        }
    }

    /// Run a job to completion.
    ///
    /// Each run stages into its own directory, so numbering restarts at 1
    /// without colliding with files kept by earlier failed runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the staging directory cannot be created, the
    /// channel history cannot be read, or a rename fails. Single download or
    /// upload failures are reported in the summary instead.
    pub async fn run(
        &self,
        job: &RelayJob,
        observer: &dyn BatchObserver,
    ) -> Result<BatchReport, RelayError> {
        let run_dir = self
            .staging_root
            .join(format!("batch-{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&run_dir).await?;
        info!(
            channel = %job.channel,
            count = job.count,
            invoker = job.invoker,
            dir = %run_dir.display(),
            "Batch relay started"
        );

        let fetched = fetch_videos(
            self.source.as_ref(),
            &job.channel,
            job.count,
            &run_dir,
            observer,
        )
        .await?;

        if fetched.is_empty() {
            info!(channel = %job.channel, "No videos found");
            remove_dir_if_empty(&run_dir).await;
            return Ok(BatchReport::NoVideos);
        }

        let mut summary = if fetched.downloaded.is_empty() {
            RelaySummary::new(0)
        } else {
            observer
                .stage(BatchStage::Renaming {
                    count: fetched.downloaded.len(),
                })
                .await;
            let renamed = rename_batch(&fetched.downloaded, &self.base_name).await?;

            let queue = Arc::new(RelayQueue::new());
            for path in renamed {
                queue.enqueue(PendingUpload::new(path));
            }
            RelayWorker::new(queue, self.uploader.clone(), self.pacing)
                .drain(observer)
                .await
        };

        summary.total += fetched.failed.len();
        for label in fetched.failed {
            summary.record_failure(label);
        }

        info!(
            channel = %job.channel,
            uploaded = summary.uploaded_count(),
            total = summary.total,
            failed = summary.failed.len(),
            "Batch relay finished"
        );
        remove_dir_if_empty(&run_dir).await;
        Ok(BatchReport::Completed(summary))
    }
}

async fn remove_dir_if_empty(dir: &Path) {
    // remove_dir refuses non-empty directories, which keeps failed files
    if let Err(e) = tokio::fs::remove_dir(dir).await {
        debug!(dir = %dir.display(), error = %e, "Staging directory kept");
    }
}
