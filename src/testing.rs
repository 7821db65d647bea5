//! Testing helpers and fakes.
//!
//! In-memory stand-ins for a Telegram source, an upload destination and a
//! progress observer, shared by unit and integration tests.

use crate::config::{DestinationKind, RelayMode, SessionKind, Settings};
use crate::destination::{UploadError, UploadReceipt, Uploader};
use crate::relay::{BatchObserver, BatchStage};
use crate::source::telegram::incoming_file_name;
use crate::source::{
    ChannelRef, ChatIdentity, HistoryPage, SourceError, SourceMessage, SourceSession, VideoFile,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;

/// Valid live-mode settings relaying to the `videos` bucket.
///
/// Every other value is at its default.
#[must_use]
pub fn test_settings() -> Settings {
    Settings {
        telegram_token: "dummy".to_string(),
        telegram_api_url: None,
        telegram_http_timeout_secs: crate::config::TELEGRAM_HTTP_TIMEOUT_SECS,
        source_session: SessionKind::Bot,
        telegram_api_id: None,
        telegram_api_hash: None,
        string_session: None,
        relay_mode: RelayMode::Live,
        target_channel: None,
        authorized_user_id: None,
        base_name: crate::config::DEFAULT_BASE_NAME.to_string(),
        staging_dir: PathBuf::from(crate::config::DEFAULT_STAGING_DIR),
        channel_log_capacity: crate::config::CHANNEL_LOG_CAPACITY,
        destination: DestinationKind::S3,
        storage_bucket_name: Some("videos".to_string()),
        storage_endpoint_url: None,
        storage_region: "auto".to_string(),
        storage_access_key_id: None,
        storage_secret_access_key: None,
        storage_prefix: None,
        storage_link_ttl_secs: crate::config::STORAGE_LINK_TTL_SECS,
        graph_page_id: None,
        graph_access_token: None,
        graph_api_url: crate::config::DEFAULT_GRAPH_API_URL.to_string(),
        graph_description: String::new(),
        upload_http_timeout_secs: crate::config::UPLOAD_HTTP_TIMEOUT_SECS,
        upload_delay_secs: None,
        idle_poll_secs: crate::config::IDLE_POLL_SECS,
        upload_max_attempts: 1,
    }
}

/// Channel history held in memory; downloads write small files to disk
pub struct FakeSource {
    posts: Vec<SourceMessage>,
    failing: HashSet<i32>,
    downloads: Mutex<Vec<i32>>,
}

impl FakeSource {
    /// Source serving `posts` as history, oldest first
    #[must_use]
    pub fn new(posts: Vec<SourceMessage>) -> Self {
        Self {
            posts,
            failing: HashSet::new(),
            downloads: Mutex::new(Vec::new()),
        }
    }

    /// Make the download of `message_id` fail
    #[must_use]
    pub fn with_failed_download(mut self, message_id: i32) -> Self {
        self.failing.insert(message_id);
        self
    }

    /// A post carrying a video
    #[must_use]
    pub fn video_post(chat_id: i64, message_id: i32, file_name: Option<&str>) -> SourceMessage {
        SourceMessage {
            chat: ChatIdentity {
                id: chat_id,
                username: None,
            },
            message_id,
            video: Some(VideoFile {
                file_id: format!("file-{message_id}"),
                file_name: file_name.map(ToString::to_string),
                mime_type: Some("video/mp4".to_string()),
                size: 16,
            }),
        }
    }

    /// A post without any video
    #[must_use]
    pub fn text_post(chat_id: i64, message_id: i32) -> SourceMessage {
        SourceMessage {
            chat: ChatIdentity {
                id: chat_id,
                username: None,
            },
            message_id,
            video: None,
        }
    }

    /// IDs of posts downloaded successfully, in order
    #[must_use]
    pub fn downloads(&self) -> Vec<i32> {
        self.downloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SourceSession for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn history(
        &self,
        channel: &ChannelRef,
        after: i32,
        limit: usize,
    ) -> Result<HistoryPage, SourceError> {
        let posts = self
            .posts
            .iter()
            .filter(|post| channel.matches(&post.chat))
            .cloned();
        Ok(HistoryPage::slice(posts, after, limit))
    }

    async fn download(&self, message: &SourceMessage, dir: &Path) -> Result<PathBuf, SourceError> {
        let video = message
            .video
            .as_ref()
            .ok_or(SourceError::NotAVideo(message.message_id))?;
        if self.failing.contains(&message.message_id) {
            return Err(SourceError::Download("connection reset".to_string()));
        }

        let path = dir.join(incoming_file_name(message, video));
        tokio::fs::write(&path, format!("video {}", message.message_id)).await?;
        self.downloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.message_id);
        Ok(path)
    }
}

/// Destination that accepts every file except the named ones and records
/// when each upload started
#[derive(Default)]
pub struct ScriptedUploader {
    failing: HashSet<String>,
    starts: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedUploader {
    /// Uploader rejecting the files named in `failing`
    #[must_use]
    pub fn failing_on<I, S>(failing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: failing.into_iter().map(Into::into).collect(),
            starts: Mutex::new(Vec::new()),
        }
    }

    /// File names in upload order, with the instant each upload started
    #[must_use]
    pub fn starts(&self) -> Vec<(String, Instant)> {
        self.starts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// File names in upload order
    #[must_use]
    pub fn uploaded_names(&self) -> Vec<String> {
        self.starts().into_iter().map(|(name, _)| name).collect()
    }
}

#[async_trait]
impl Uploader for ScriptedUploader {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn upload(&self, path: &Path) -> Result<UploadReceipt, UploadError> {
        let name = crate::relay::display_name(path);
        self.starts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.clone(), Instant::now()));

        if self.failing.contains(&name) {
            return Err(UploadError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(UploadReceipt {
            remote_id: format!("remote/{name}"),
            link: None,
        })
    }
}

/// Observer keeping every stage it was told about
#[derive(Default)]
pub struct RecordingObserver {
    stages: Mutex<Vec<BatchStage>>,
}

impl RecordingObserver {
    /// Stages seen so far, in order
    #[must_use]
    pub fn stages(&self) -> Vec<BatchStage> {
        self.stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BatchObserver for RecordingObserver {
    async fn stage(&self, stage: BatchStage) {
        self.stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stage);
    }
}
