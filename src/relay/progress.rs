use async_trait::async_trait;

/// Stage of a running batch, reported to the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStage {
    /// Downloading videos from channel history
    Downloading {
        /// Videos finished so far
        done: usize,
        /// Videos selected for this run
        total: usize,
    },
    /// Assigning sequential names
    Renaming {
        /// Number of files being renamed
        count: usize,
    },
    /// Uploading one file
    Uploading {
        /// 1-based position of the file in the run
        current: usize,
        /// Files queued for upload in this run
        total: usize,
        /// File being uploaded
        file: String,
    },
}

/// Receives batch progress updates
#[async_trait]
pub trait BatchObserver: Send + Sync {
    /// Called whenever the run enters a new stage
    async fn stage(&self, stage: BatchStage);
}

/// Observer that ignores every update
pub struct SilentObserver;

#[async_trait]
impl BatchObserver for SilentObserver {
    async fn stage(&self, _stage: BatchStage) {}
}
