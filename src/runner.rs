use crate::bot::handlers::{handle_command, handle_post};
use crate::bot::{AppState, BatchRunner, Command};
use crate::config::{RelayMode, SessionKind, Settings};
use crate::destination::{build_uploader, Uploader};
use crate::relay::live::leftover_files;
use crate::relay::{BatchRelay, LiveRelay, LiveSession, Pacing, RelayQueue, RelayWorker};
use crate::source::{build_source, ChannelLog, ChannelRef, SourceSession};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{info, warn};

/// Run the relay until ctrl-c.
///
/// # Errors
///
/// Returns an error if the destination, the Telegram client or the staging
/// directory cannot be set up.
pub async fn run(settings: Arc<Settings>) -> Result<()> {
    let uploader = build_uploader(&settings).context("failed to set up upload destination")?;
    let bot = build_bot(&settings)?;

    let log = Arc::new(ChannelLog::new(settings.channel_log_capacity));
    let source = build_source(&settings, bot.clone(), log.clone())
        .context("failed to set up Telegram source session")?;
    info!(session = source.name(), "Source session ready");

    tokio::fs::create_dir_all(&settings.staging_dir)
        .await
        .with_context(|| format!("failed to create {}", settings.staging_dir.display()))?;
    let pacing = Pacing::from_settings(&settings);

    let state = match settings.relay_mode {
        RelayMode::Live => {
            let live = init_live(&settings, source, uploader, pacing).await?;
            AppState {
                settings: settings.clone(),
                log,
                live: Some(live),
                batch: None,
            }
        }
        RelayMode::Batch => {
            let relay = BatchRelay::new(
                source,
                uploader,
                pacing,
                settings.base_name.clone(),
                settings.staging_dir.clone(),
            );
            info!(
                authorized_user_id = settings.authorized_user_id,
                "Batch mode: waiting for /relay"
            );
            if settings.source_session == SessionKind::Bot {
                warn!("Bot session: /relay only sees posts delivered since startup; set SOURCE_SESSION=user to read full history");
            }
            AppState {
                settings: settings.clone(),
                log,
                live: None,
                batch: Some(Arc::new(BatchRunner::new(relay))),
            }
        }
    };

    info!(
        mode = ?settings.relay_mode,
        destination = ?settings.destination,
        delay_secs = pacing.upload_delay.as_secs(),
        "Bot is running..."
    );

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![Arc::new(state)])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Dispatcher stopped");
    Ok(())
}

async fn init_live(
    settings: &Settings,
    source: Arc<dyn SourceSession>,
    uploader: Arc<dyn Uploader>,
    pacing: Pacing,
) -> Result<Arc<LiveRelay>> {
    let channel = settings
        .target_channel
        .as_deref()
        .map(str::parse::<ChannelRef>)
        .transpose()?;
    match &channel {
        Some(channel) => info!(channel = %channel, "Live mode: watching channel"),
        None => warn!("TARGET_CHANNEL is not set: videos posted in any chat will be relayed"),
    }

    let leftover = leftover_files(&settings.staging_dir).await?;
    if leftover > 0 {
        warn!(
            files = leftover,
            dir = %settings.staging_dir.display(),
            "Staging directory holds files from an earlier run; numbering restarts at 1 and may repeat their names"
        );
    }

    let queue = Arc::new(RelayQueue::new());
    let session = LiveSession::new(
        settings.staging_dir.clone(),
        settings.base_name.clone(),
        queue.clone(),
    );
    tokio::spawn(RelayWorker::new(queue, uploader, pacing).run());

    Ok(Arc::new(LiveRelay::new(source, session, channel)))
}

/// Telegram client with a timeout long enough for large downloads and an
/// optional local Bot API server.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the API URL is
/// invalid.
pub fn build_bot(settings: &Settings) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(settings.telegram_http_timeout_secs))
        .build()
        .context("failed to build Telegram HTTP client")?;
    let bot = Bot::with_client(settings.telegram_token.clone(), client);

    match settings.telegram_api_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            let url = reqwest::Url::parse(url).context("invalid TELEGRAM_API_URL")?;
            info!(api_url = %url, "Using custom Bot API server");
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}

/// Update routing: channel posts feed the relay, commands go to the command
/// endpoint, other messages are recorded like posts.
#[must_use]
pub fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_channel_post().endpoint(handle_post))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(dptree::endpoint(handle_post)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_settings;

    #[test]
    fn test_build_bot_default_api() -> Result<()> {
        let bot = build_bot(&test_settings())?;
        assert_eq!(bot.api_url().as_str(), "https://api.telegram.org/");
        Ok(())
    }

    #[test]
    fn test_build_bot_local_server() -> Result<()> {
        let mut settings = test_settings();
        settings.telegram_api_url = Some("http://localhost:8081".into());
        let bot = build_bot(&settings)?;
        assert_eq!(bot.api_url().as_str(), "http://localhost:8081/");
        Ok(())
    }

    #[test]
    fn test_build_bot_rejects_bad_url() {
        let mut settings = test_settings();
        settings.telegram_api_url = Some("not a url".into());
        assert!(build_bot(&settings).is_err());
    }

    #[tokio::test]
    async fn test_live_init_rejects_bad_channel() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut settings = test_settings();
        settings.staging_dir = dir.path().to_path_buf();
        settings.target_channel = Some("t.me/+invite".into());

        let source: Arc<dyn SourceSession> =
            Arc::new(crate::testing::FakeSource::new(Vec::new()));
        let uploader: Arc<dyn Uploader> = Arc::new(crate::testing::ScriptedUploader::default());
        let result = init_live(&settings, source, uploader, Pacing::from_settings(&settings)).await;
        assert!(result.is_err());
        Ok(())
    }
}
