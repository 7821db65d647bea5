use super::command::Command;
use super::resilient::send_message_resilient;
use super::state::{AppState, RelayDecision};
use super::status::{render_started, StatusMessage};
use crate::source::telegram::source_message;
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

/// Reply to a second `/relay` while one is running
pub const ALREADY_RUNNING: &str = "⏳ A relay is already running, try again when it finishes";

/// Reply to `/relay` when the process runs in live mode
pub const BATCH_DISABLED: &str = "ℹ️ Batch relay is disabled: the bot runs in live mode";

/// Telegram ID of the sender, or 0 for anonymous messages
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Endpoint for channel posts and non-command messages.
///
/// Every post is recorded in the channel log; in live mode video posts from
/// the watched channel are relayed.
pub async fn handle_post(msg: Message, state: Arc<AppState>) -> Result<(), teloxide::RequestError> {
    let post = source_message(&msg);
    state.log.record(post.clone());

    if post.video.is_none() {
        return respond(());
    }
    let Some(live) = state.live.as_ref() else {
        return respond(());
    };
    if !live.accepts(&post.chat) {
        return respond(());
    }

    if let Err(e) = live.handle_video(&post).await {
        error!(
            chat_id = post.chat.id,
            message_id = post.message_id,
            kind = e.kind(),
            error = %e,
            "Failed to stage video"
        );
    }
    respond(())
}

/// Endpoint for bot commands
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<AppState>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => start(&bot, &msg).await,
        Command::Help => help(&bot, &msg).await,
        Command::Relay(args) => relay(&bot, &msg, &args, &state).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn start(bot: &Bot, msg: &Message) -> Result<()> {
    let text = format!(
        "👋 I relay channel videos to the configured destination, one at a time.\n\n{}",
        Command::descriptions()
    );
    send_message_resilient(bot, msg.chat.id, text, None).await?;
    Ok(())
}

async fn help(bot: &Bot, msg: &Message) -> Result<()> {
    send_message_resilient(bot, msg.chat.id, Command::descriptions().to_string(), None).await?;
    Ok(())
}

async fn relay(bot: &Bot, msg: &Message, args: &str, state: &AppState) -> Result<()> {
    let invoker = get_user_id_safe(msg);
    let accepted = match state.decide_relay(invoker, args) {
        RelayDecision::Accepted(accepted) => accepted,
        RelayDecision::Rejected(rejection) => {
            info!(user_id = invoker, reason = %rejection, "Relay request rejected");
            send_message_resilient(bot, msg.chat.id, rejection.to_string(), None).await?;
            return Ok(());
        }
        RelayDecision::Disabled => {
            send_message_resilient(bot, msg.chat.id, BATCH_DISABLED, None).await?;
            return Ok(());
        }
        RelayDecision::AlreadyRunning => {
            warn!(user_id = invoker, "Relay request while another run is active");
            send_message_resilient(bot, msg.chat.id, ALREADY_RUNNING, None).await?;
            return Ok(());
        }
    };

    let status_msg = send_message_resilient(
        bot,
        msg.chat.id,
        render_started(&accepted.job.channel, accepted.job.count),
        Some(ParseMode::Html),
    )
    .await?;

    // The run outlives this update so the chat's next updates are not held back
    let task_bot = bot.clone();
    let chat_id = msg.chat.id;
    tokio::spawn(async move {
        let status = StatusMessage::new(task_bot.clone(), chat_id, status_msg.id);
        let messages = accepted.run(&status).await;
        deliver_report(&task_bot, chat_id, &status, messages).await;
    });
    Ok(())
}

async fn deliver_report(bot: &Bot, chat_id: ChatId, status: &StatusMessage, messages: Vec<String>) {
    let mut messages = messages.into_iter();
    if let Some(head) = messages.next() {
        if !status.show(&head).await {
            if let Err(e) = send_message_resilient(bot, chat_id, head, Some(ParseMode::Html)).await {
                error!("Failed to send relay report: {}", e);
            }
        }
    }
    for part in messages {
        if let Err(e) = send_message_resilient(bot, chat_id, part, Some(ParseMode::Html)).await {
            error!("Failed to send relay report: {}", e);
            break;
        }
    }
}
