//! Video sources
//!
//! A [`SourceSession`] pages through a channel's posts oldest first and
//! downloads the video attached to a post. Two variants exist: a Bot API
//! session serving the posts it has observed, and an MTProto user session
//! reading the channel's full history. `SOURCE_SESSION` picks one.

use crate::config::{SessionKind, Settings};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use teloxide::Bot;
use thiserror::Error;

/// Channel identifiers
pub mod channel;
/// Bounded history scan for batch runs
pub mod fetcher;
/// Telegram Bot API session
pub mod telegram;
/// MTProto user session
pub mod user;

pub use channel::{ChannelRef, ChannelRefError};
pub use telegram::{BotSession, ChannelLog};
pub use user::{UserSession, UserSessionConfig};

/// Errors raised by a video source
#[derive(Error, Debug)]
pub enum SourceError {
    /// Telegram API request failed
    #[error("Telegram error: {0}")]
    Telegram(String),
    /// File transfer failed
    #[error("Download error: {0}")]
    Download(String),
    /// Writing the download failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The post carries no video
    #[error("message {0} has no video")]
    NotAVideo(i32),
    /// The session cannot be set up from the configuration
    #[error("Session error: {0}")]
    Session(String),
}

/// Chat a post was published in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatIdentity {
    /// Numeric chat ID (`-100…` for channels)
    pub id: i64,
    /// Public username, without `@`
    pub username: Option<String>,
}

/// Video payload of a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFile {
    /// Opaque source-specific file handle
    pub file_id: String,
    /// Original file name, when the sender kept one
    pub file_name: Option<String>,
    /// MIME type, e.g. `video/mp4`
    pub mime_type: Option<String>,
    /// Size in bytes
    pub size: u64,
}

/// A post seen in a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    /// Chat the post belongs to
    pub chat: ChatIdentity,
    /// Post ID within the chat
    pub message_id: i32,
    /// Video payload, if any
    pub video: Option<VideoFile>,
}

impl SourceMessage {
    /// Label used when the post fails before it has a file name
    #[must_use]
    pub fn label(&self) -> String {
        format!("message #{} (download failed)", self.message_id)
    }
}

/// A slice of channel history, oldest first
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    /// Posts in this slice
    pub messages: Vec<SourceMessage>,
    /// Cursor for the following slice; `None` once history is exhausted
    pub next: Option<i32>,
}

impl HistoryPage {
    /// Page of `posts` (one chat, oldest first) newer than `after`, holding
    /// at most `limit` entries
    #[must_use]
    pub fn slice<I>(posts: I, after: i32, limit: usize) -> Self
    where
        I: IntoIterator<Item = SourceMessage>,
    {
        let mut rest = posts.into_iter().filter(|post| post.message_id > after);
        let messages: Vec<_> = rest.by_ref().take(limit).collect();
        let next = match (messages.last(), rest.next()) {
            (Some(last), Some(_)) => Some(last.message_id),
            _ => None,
        };
        Self { messages, next }
    }
}

/// Source of channel posts and their videos
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceSession: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Up to `limit` posts of `channel` with an ID above `after`, oldest
    /// first. Start with `after = 0` and continue from [`HistoryPage::next`].
    async fn history(
        &self,
        channel: &ChannelRef,
        after: i32,
        limit: usize,
    ) -> Result<HistoryPage, SourceError>;

    /// Download the video of `message` into `dir` and return its path
    async fn download(&self, message: &SourceMessage, dir: &Path) -> Result<PathBuf, SourceError>;
}

/// Build the source session selected by `SOURCE_SESSION`.
///
/// The user session decodes its stored login here and connects on first use.
///
/// # Errors
///
/// Returns [`SourceError::Session`] if the user session settings are
/// missing or the stored session cannot be decoded.
pub fn build_source(
    settings: &Settings,
    bot: Bot,
    log: Arc<ChannelLog>,
) -> Result<Arc<dyn SourceSession>, SourceError> {
    match settings.source_session {
        SessionKind::Bot => Ok(Arc::new(BotSession::new(bot, log))),
        SessionKind::User => {
            let config = UserSessionConfig::from_settings(settings)?;
            Ok(Arc::new(UserSession::new(config)?))
        }
    }
}
