//! Telegram sends and edits with automatic retry on transient failures.
//!
//! Every call goes through [`crate::utils::retry_telegram_operation`], so a
//! dropped connection during a long relay does not lose the status message
//! or the final report.

use crate::utils::{retry_telegram_operation, truncate_str};
use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message, MessageId, ParseMode};
use tracing::{debug, warn};

/// Telegram allows 4096 characters; the margin leaves room for the suffix
pub(crate) const MAX_MESSAGE_CHARS: usize = 4000;

/// Send a message with automatic retry on network failures.
///
/// Text over the Telegram limit is truncated with a marker matching
/// `parse_mode`; split it with [`crate::utils::split_long_message`] first
/// when every line must arrive.
///
/// # Arguments
///
/// * `bot` - The Telegram bot instance
/// * `chat_id` - Target chat ID
/// * `text` - Message text to send
/// * `parse_mode` - Optional parse mode; `None` sends plain text
///
/// # Errors
///
/// Returns the last error once every attempt has failed.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = fit_message(&text.into(), parse_mode);
    retry_telegram_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Edit a message with automatic retry on network failures.
///
/// The text is sent as is: callers keep edits under the Telegram limit.
///
/// # Arguments
///
/// * `bot` - The Telegram bot instance
/// * `chat_id` - Chat ID containing the message
/// * `msg_id` - ID of the message to edit
/// * `text` - New message text
/// * `parse_mode` - Optional parse mode
///
/// # Errors
///
/// Returns the last error once every attempt has failed, including the
/// "message is not modified" answer.
pub async fn edit_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = text.into();
    retry_telegram_operation(|| async {
        let mut req = bot.edit_message_text(chat_id, msg_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram edit error: {e}"))
    })
    .await
}

/// Edit an HTML message, never failing.
///
/// Over-long text is truncated. "Not modified" and "not found" answers are
/// expected during progress updates and only logged at debug level.
///
/// Returns `true` when the message now shows `text`.
pub async fn edit_message_safe_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
) -> bool {
    const ERROR_NOT_MODIFIED: &str = "message is not modified";
    const ERROR_NOT_FOUND: &str = "message to edit not found";

    let html = Some(ParseMode::Html);
    match edit_message_resilient(bot, chat_id, msg_id, fit_message(text, html), html).await
    {
        Ok(_) => true,
        Err(e) => {
            let err_msg = e.to_string();
            if err_msg.contains(ERROR_NOT_MODIFIED) {
                debug!("Message update skipped: {err_msg}");
                true
            } else if err_msg.contains(ERROR_NOT_FOUND) {
                debug!("Message update skipped: {err_msg}");
                false
            } else {
                warn!("Failed to edit message after retries: {e}");
                false
            }
        }
    }
}

/// Cut `text` to the Telegram limit, never leaving a broken HTML entity or
/// tag behind
fn fit_message(text: &str, parse_mode: Option<ParseMode>) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }

    let mut cut = truncate_str(text, MAX_MESSAGE_CHARS);
    if matches!(parse_mode, Some(ParseMode::Html)) {
        if let Some(pos) = cut.rfind(['&', '<']) {
            if !cut[pos..].contains([';', '>']) {
                cut.truncate(pos);
            }
        }
        format!("{cut}…\n\n<i>(message truncated)</i>")
    } else {
        format!("{cut}…\n\n(message truncated)")
    }
}
