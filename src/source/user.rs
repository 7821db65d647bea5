//! Telegram user session over MTProto
//!
//! Reads a channel's complete history and downloads media without the Bot
//! API's 20 MB cap. The login is `STRING_SESSION`: a saved grammers session,
//! base64 encoded. The client connects on first use and is reused for the
//! life of the process.

use super::telegram::incoming_file_name;
use super::{
    ChannelRef, ChatIdentity, HistoryPage, SourceError, SourceMessage, SourceSession, VideoFile,
};
use crate::config::Settings;
use async_trait::async_trait;
use base64::Engine;
use grammers_client::session::{PackedChat, PackedType, Session};
use grammers_client::types::{Downloadable, Media, Message};
use grammers_client::{Client, Config, InitParams};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Offset between a channel's MTProto ID and its Bot API ID (`-100…`)
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Largest number of messages fetched by ID in one call
const MESSAGES_PER_CALL: usize = 100;

/// Credentials of the user session
pub struct UserSessionConfig {
    /// Application ID from my.telegram.org
    pub api_id: i32,
    /// Application hash from my.telegram.org
    pub api_hash: String,
    /// Saved session bytes
    pub session: Vec<u8>,
}

impl UserSessionConfig {
    /// Read the credentials from settings and decode the stored session.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Session`] naming the first missing value, or
    /// if `STRING_SESSION` is not valid base64.
    pub fn from_settings(settings: &Settings) -> Result<Self, SourceError> {
        let missing =
            |key: &str| SourceError::Session(format!("{key} is required for SOURCE_SESSION=user"));

        let api_id = settings
            .telegram_api_id
            .ok_or_else(|| missing("TELEGRAM_API_ID"))?;
        let api_hash = settings
            .telegram_api_hash
            .clone()
            .filter(|hash| !hash.trim().is_empty())
            .ok_or_else(|| missing("TELEGRAM_API_HASH"))?;
        let encoded = settings
            .string_session
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("STRING_SESSION"))?;
        let session = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| SourceError::Session(format!("STRING_SESSION is not base64: {e}")))?;

        Ok(Self {
            api_id,
            api_hash,
            session,
        })
    }
}

/// User-account session backed by `grammers`
pub struct UserSession {
    api_id: i32,
    api_hash: String,
    session: Vec<u8>,
    client: OnceCell<Client>,
    chats: Mutex<HashMap<i64, PackedChat>>,
}

impl UserSession {
    /// Validate the stored session; the connection is opened lazily.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Session`] if the session bytes cannot be
    /// loaded.
    pub fn new(config: UserSessionConfig) -> Result<Self, SourceError> {
        Session::load(&config.session)
            .map_err(|e| SourceError::Session(format!("STRING_SESSION cannot be loaded: {e}")))?;
        Ok(Self {
            api_id: config.api_id,
            api_hash: config.api_hash,
            session: config.session,
            client: OnceCell::new(),
            chats: Mutex::new(HashMap::new()),
        })
    }

    async fn client(&self) -> Result<&Client, SourceError> {
        self.client
            .get_or_try_init(|| async {
                let session = Session::load(&self.session)
                    .map_err(|e| SourceError::Session(e.to_string()))?;
                let client = Client::connect(Config {
                    session,
                    api_id: self.api_id,
                    api_hash: self.api_hash.clone(),
                    params: InitParams::default(),
                })
                .await
                .map_err(telegram_error)?;

                if !client.is_authorized().await.map_err(telegram_error)? {
                    return Err(SourceError::Session(
                        "STRING_SESSION is not signed in".to_string(),
                    ));
                }
                info!(api_id = self.api_id, "User session connected");
                Ok(client)
            })
            .await
    }

    fn cached(&self, chat_id: i64) -> Option<PackedChat> {
        self.chats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chat_id)
            .copied()
    }

    fn remember(&self, chat_id: i64, chat: PackedChat) {
        self.chats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chat_id, chat);
    }

    async fn resolve(&self, channel: &ChannelRef) -> Result<(PackedChat, ChatIdentity), SourceError> {
        let client = self.client().await?;
        match channel {
            ChannelRef::Username(name) => {
                let chat = client
                    .resolve_username(name)
                    .await
                    .map_err(telegram_error)?
                    .ok_or_else(|| SourceError::Telegram(format!("@{name} not found")))?;
                let packed = chat.pack();
                let identity = ChatIdentity {
                    id: bot_api_id(packed.ty, packed.id),
                    username: Some(name.clone()),
                };
                self.remember(identity.id, packed);
                Ok((packed, identity))
            }
            ChannelRef::Id(id) => {
                let identity = ChatIdentity {
                    id: *id,
                    username: None,
                };
                if let Some(packed) = self.cached(*id) {
                    return Ok((packed, identity));
                }

                // Access hashes of numeric IDs are only known from the dialog list
                let mut dialogs = client.iter_dialogs();
                while let Some(dialog) = dialogs.next().await.map_err(telegram_error)? {
                    let packed = dialog.chat().pack();
                    if bot_api_id(packed.ty, packed.id) == *id {
                        self.remember(*id, packed);
                        return Ok((packed, identity));
                    }
                }
                Err(SourceError::Telegram(format!(
                    "chat {id} is not among the account's dialogs"
                )))
            }
        }
    }

    async fn chat_of(&self, chat: &ChatIdentity) -> Result<PackedChat, SourceError> {
        if let Some(packed) = self.cached(chat.id) {
            return Ok(packed);
        }
        let channel = chat
            .username
            .clone()
            .map_or(ChannelRef::Id(chat.id), ChannelRef::Username);
        Ok(self.resolve(&channel).await?.0)
    }
}

#[async_trait]
impl SourceSession for UserSession {
    fn name(&self) -> &'static str {
        "user"
    }

    async fn history(
        &self,
        channel: &ChannelRef,
        after: i32,
        limit: usize,
    ) -> Result<HistoryPage, SourceError> {
        let (chat, identity) = self.resolve(channel).await?;
        let client = self.client().await?;

        let mut newest_iter = client.iter_messages(chat).limit(1);
        let newest = newest_iter
            .next()
            .await
            .map_err(telegram_error)?
            .map_or(0, |msg| msg.id());
        if after >= newest {
            return Ok(HistoryPage::default());
        }

        // Channel post IDs are sequential, so ascending ID ranges walk the
        // history oldest first; deleted posts come back empty.
        let span = i32::try_from(limit.clamp(1, MESSAGES_PER_CALL)).unwrap_or(1);
        let last = newest.min(after.saturating_add(span));
        let ids: Vec<i32> = (after + 1..=last).collect();
        let messages: Vec<SourceMessage> = client
            .get_messages_by_id(chat, &ids)
            .await
            .map_err(telegram_error)?
            .into_iter()
            .flatten()
            .map(|msg| source_message(&msg, &identity))
            .collect();

        debug!(
            channel = %channel,
            after,
            last,
            newest,
            posts = messages.len(),
            "Read history page"
        );
        Ok(HistoryPage {
            messages,
            next: (last < newest).then_some(last),
        })
    }

    async fn download(&self, message: &SourceMessage, dir: &Path) -> Result<PathBuf, SourceError> {
        let video = message
            .video
            .as_ref()
            .ok_or(SourceError::NotAVideo(message.message_id))?;
        let target = dir.join(incoming_file_name(message, video));

        let chat = self.chat_of(&message.chat).await?;
        let client = self.client().await?;
        let media = client
            .get_messages_by_id(chat, &[message.message_id])
            .await
            .map_err(telegram_error)?
            .into_iter()
            .flatten()
            .next()
            .and_then(|msg| msg.media())
            .ok_or(SourceError::NotAVideo(message.message_id))?;

        let mut dst = tokio::fs::File::create(&target).await?;
        let mut chunks = client.iter_download(&Downloadable::Media(media));
        let mut written: u64 = 0;
        let transfer: Result<(), SourceError> = async {
            while let Some(chunk) = chunks
                .next()
                .await
                .map_err(|e| SourceError::Download(e.to_string()))?
            {
                dst.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            dst.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = transfer {
            drop(dst);
            if let Err(rm) = tokio::fs::remove_file(&target).await {
                warn!(path = %target.display(), error = %rm, "Failed to remove partial download");
            }
            return Err(e);
        }

        info!(
            message_id = message.message_id,
            size_bytes = written,
            path = %target.display(),
            "Downloaded video over user session"
        );
        Ok(target)
    }
}

fn telegram_error(e: impl std::fmt::Display) -> SourceError {
    SourceError::Telegram(e.to_string())
}

/// Bot API chat ID of an MTProto peer
fn bot_api_id(ty: PackedType, id: i64) -> i64 {
    match ty {
        PackedType::User | PackedType::Bot => id,
        PackedType::Chat => -id,
        PackedType::Megagroup | PackedType::Broadcast | PackedType::Gigagroup => {
            -(CHANNEL_ID_OFFSET + id)
        }
    }
}

fn source_message(msg: &Message, chat: &ChatIdentity) -> SourceMessage {
    let video = match msg.media() {
        Some(Media::Document(doc))
            if doc
                .mime_type()
                .is_some_and(|mime| mime.starts_with("video/")) =>
        {
            Some(VideoFile {
                file_id: format!("{}:{}", chat.id, msg.id()),
                file_name: Some(doc.name().to_string()).filter(|name| !name.is_empty()),
                mime_type: doc.mime_type().map(str::to_string),
                size: u64::try_from(doc.size()).unwrap_or(0),
            })
        }
        _ => None,
    };
    SourceMessage {
        chat: chat.clone(),
        message_id: msg.id(),
        video,
    }
}
