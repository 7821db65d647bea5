//! Sequential relay pipeline
//!
//! Downloaded files are renamed to `"<base> <n>.<ext>"`, queued, and handed
//! to a single worker that uploads them one at a time with a fixed pause
//! between uploads.

use crate::source::SourceError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Batch run: fetch, rename, drain
pub mod batch;
/// Live run: per-post staging into a long-lived queue
pub mod live;
/// Progress reporting for batch runs
pub mod progress;
/// FIFO queue and its single consumer
pub mod queue;
/// Sequential file naming
pub mod renamer;
/// Per-run upload accounting
pub mod summary;

pub use batch::{BatchRelay, BatchReport, RelayJob};
pub use live::{LiveRelay, LiveSession};
pub use progress::{BatchObserver, BatchStage};
pub use queue::{Cleanup, Pacing, RelayAttempt, RelayQueue, RelayWorker};
pub use renamer::{rename_batch, rename_one, sequential_name};
pub use summary::RelaySummary;

/// Errors that abort a relay step
#[derive(Error, Debug)]
pub enum RelayError {
    /// A staged file could not be moved to its sequential name
    #[error("failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        /// Downloaded file
        from: PathBuf,
        /// Sequential name it should have received
        to: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },
    /// Staging directory I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The video source failed as a whole (not a single download)
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

impl RelayError {
    /// Short label used when reporting the error to the user
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Rename { .. } => "RenameError",
            Self::Io(_) => "IoError",
            Self::Source(_) => "SourceError",
        }
    }
}

/// A downloaded video waiting for its upload slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    /// Location in the staging directory
    pub path: PathBuf,
}

impl PendingUpload {
    /// Wrap a staged path
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// File name shown in logs and summaries
    #[must_use]
    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

/// Final path component, or the whole path when there is none
#[must_use]
pub fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}
