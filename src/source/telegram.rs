//! Telegram Bot API session
//!
//! The Bot API has no history call, so every post the dispatcher delivers is
//! recorded in a bounded [`ChannelLog`] and batch history is served from it.
//! Posts older than the process are only reachable through the user session.

use super::{
    ChannelRef, ChatIdentity, HistoryPage, SourceError, SourceMessage, SourceSession, VideoFile,
};
use crate::utils::retry_telegram_operation;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Recent posts observed by the bot, oldest first
#[derive(Debug)]
pub struct ChannelLog {
    capacity: usize,
    posts: Mutex<VecDeque<SourceMessage>>,
}

impl ChannelLog {
    /// Log keeping at most `capacity` posts across all chats
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            posts: Mutex::new(VecDeque::new()),
        }
    }

    /// Remember a post, evicting the oldest one when full
    pub fn record(&self, message: SourceMessage) {
        let mut posts = self.posts.lock().unwrap_or_else(PoisonError::into_inner);
        if posts.len() == self.capacity {
            posts.pop_front();
        }
        posts.push_back(message);
    }

    /// Posts of `channel`, oldest first
    #[must_use]
    pub fn history(&self, channel: &ChannelRef) -> Vec<SourceMessage> {
        self.posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|message| channel.matches(&message.chat))
            .cloned()
            .collect()
    }

    /// Number of remembered posts
    #[must_use]
    pub fn len(&self) -> usize {
        self.posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bot-token session backed by `teloxide`
#[derive(Clone)]
pub struct BotSession {
    bot: Bot,
    log: Arc<ChannelLog>,
}

impl BotSession {
    /// Create a session serving history from `log`
    #[must_use]
    pub const fn new(bot: Bot, log: Arc<ChannelLog>) -> Self {
        Self { bot, log }
    }

    /// Log of observed posts
    #[must_use]
    pub const fn log(&self) -> &Arc<ChannelLog> {
        &self.log
    }
}

#[async_trait]
impl SourceSession for BotSession {
    fn name(&self) -> &'static str {
        "bot"
    }

    async fn history(
        &self,
        channel: &ChannelRef,
        after: i32,
        limit: usize,
    ) -> Result<HistoryPage, SourceError> {
        let page = HistoryPage::slice(self.log.history(channel), after, limit);
        debug!(
            channel = %channel,
            after,
            posts = page.messages.len(),
            "Serving history from channel log"
        );
        Ok(page)
    }

    async fn download(&self, message: &SourceMessage, dir: &Path) -> Result<PathBuf, SourceError> {
        let video = message
            .video
            .as_ref()
            .ok_or(SourceError::NotAVideo(message.message_id))?;
        let target = dir.join(incoming_file_name(message, video));

        let file = retry_telegram_operation(|| async {
            self.bot
                .get_file(FileId(video.file_id.clone()))
                .await
                .map_err(|e| anyhow::anyhow!(e))
        })
        .await
        .map_err(|e| SourceError::Telegram(e.to_string()))?;

        let mut dst = tokio::fs::File::create(&target).await?;
        let transfer = self.bot.download_file(&file.path, &mut dst).await;
        if let Err(e) = transfer {
            drop(dst);
            if let Err(rm) = tokio::fs::remove_file(&target).await {
                warn!(path = %target.display(), error = %rm, "Failed to remove partial download");
            }
            return Err(SourceError::Download(e.to_string()));
        }
        dst.flush().await?;

        info!(
            message_id = message.message_id,
            size_bytes = video.size,
            path = %target.display(),
            "Downloaded video"
        );
        Ok(target)
    }
}

/// Convert a Telegram post into a source message
#[must_use]
pub fn source_message(msg: &Message) -> SourceMessage {
    SourceMessage {
        chat: ChatIdentity {
            id: msg.chat.id.0,
            username: msg.chat.username().map(ToString::to_string),
        },
        message_id: msg.id.0,
        video: video_file(msg),
    }
}

/// Video payload of a post: a native video, or a document with a `video/*`
/// MIME type
#[must_use]
pub fn video_file(msg: &Message) -> Option<VideoFile> {
    if let Some(video) = msg.video() {
        return Some(VideoFile {
            file_id: video.file.id.0.clone(),
            file_name: video.file_name.clone(),
            mime_type: video.mime_type.as_ref().map(ToString::to_string),
            size: u64::from(video.file.size),
        });
    }

    msg.document()
        .filter(|doc| {
            doc.mime_type
                .as_ref()
                .is_some_and(|mime| mime.type_() == "video")
        })
        .map(|doc| VideoFile {
            file_id: doc.file.id.0.clone(),
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.as_ref().map(ToString::to_string),
            size: u64::from(doc.file.size),
        })
}

/// Staging name of a download, unique per chat and post:
/// `incoming-<chat>-<post><ext>`
#[must_use]
pub fn incoming_file_name(message: &SourceMessage, video: &VideoFile) -> String {
    let ext = video
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .or_else(|| video.mime_type.as_deref().and_then(extension_for_mime).map(str::to_string))
        .unwrap_or_default();
    format!("incoming-{}-{}{ext}", message.chat.id.unsigned_abs(), message.message_id)
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "video/mp4" => Some(".mp4"),
        "video/quicktime" => Some(".mov"),
        "video/x-matroska" => Some(".mkv"),
        "video/webm" => Some(".webm"),
        "video/x-msvideo" => Some(".avi"),
        "video/mpeg" => Some(".mpeg"),
        _ => None,
    }
}
