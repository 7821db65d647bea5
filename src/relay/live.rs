use super::renamer::rename_one;
use super::{PendingUpload, RelayError, RelayQueue};
use crate::source::{ChannelRef, ChatIdentity, SourceMessage, SourceSession};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// State of a live relay: sequence counter, staging directory and queue.
///
/// The counter lives as long as the process and starts from zero on every
/// start, so ordinals repeat across restarts.
pub struct LiveSession {
    staging_dir: PathBuf,
    base_name: String,
    counter: Mutex<usize>,
    queue: Arc<RelayQueue>,
}

impl LiveSession {
    /// Create a session with a fresh counter
    #[must_use]
    pub fn new(staging_dir: PathBuf, base_name: String, queue: Arc<RelayQueue>) -> Self {
        Self {
            staging_dir,
            base_name,
            counter: Mutex::new(0),
            queue,
        }
    }

    /// Directory downloads are written to
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Queue fed by this session
    #[must_use]
    pub const fn queue(&self) -> &Arc<RelayQueue> {
        &self.queue
    }

    /// Last ordinal handed out
    pub async fn counter(&self) -> usize {
        *self.counter.lock().await
    }

    /// Give a downloaded file the next sequential name and queue it.
    ///
    /// Increment, rename and enqueue happen under one lock, so concurrent
    /// handlers cannot interleave numbering and queue order.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Rename` if the move fails. The ordinal is consumed
    /// anyway so one stuck name cannot block every later video.
    pub async fn stage(&self, downloaded: &Path) -> Result<PendingUpload, RelayError> {
        let mut counter = self.counter.lock().await;
        *counter += 1;
        let renamed = rename_one(downloaded, &self.base_name, *counter).await?;

        let item = PendingUpload::new(renamed);
        self.queue.enqueue(item.clone());
        info!(
            file = %item.file_name(),
            ordinal = *counter,
            queued = self.queue.len(),
            "Queued for upload"
        );
        Ok(item)
    }
}

/// Count files left in the staging directory by an earlier run.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be listed.
pub async fn leftover_files(dir: &Path) -> std::io::Result<usize> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            count += 1;
        }
    }
    Ok(count)
}

/// Event-driven relay of new video posts
pub struct LiveRelay {
    source: Arc<dyn SourceSession>,
    session: LiveSession,
    channel: Option<ChannelRef>,
}

impl LiveRelay {
    /// Relay videos posted to `channel`, or to any chat when `None`
    #[must_use]
    pub fn new(
        source: Arc<dyn SourceSession>,
        session: LiveSession,
        channel: Option<ChannelRef>,
    ) -> Self {
        Self {
            source,
            session,
            channel,
        }
    }

    /// Session state shared with the worker
    #[must_use]
    pub const fn session(&self) -> &LiveSession {
        &self.session
    }

    /// True when posts from `chat` should be relayed
    #[must_use]
    pub fn accepts(&self, chat: &ChatIdentity) -> bool {
        self.channel
            .as_ref()
            .is_none_or(|channel| channel.matches(chat))
    }

    /// Download, rename and enqueue one video post.
    ///
    /// # Errors
    ///
    /// Returns an error if the download or the rename fails; the caller logs
    /// it and the post is skipped.
    pub async fn handle_video(&self, message: &SourceMessage) -> Result<PendingUpload, RelayError> {
        info!(
            chat_id = message.chat.id,
            message_id = message.message_id,
            "New video detected"
        );

        let downloaded = self
            .source
            .download(message, self.session.staging_dir())
            .await?;

        self.session.stage(&downloaded).await.inspect_err(|e| {
            warn!(path = %downloaded.display(), error = %e, "Downloaded file left unrenamed");
        })
    }
}
