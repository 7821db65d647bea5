use crate::config::MAX_BATCH_COUNT;
use crate::relay::RelayJob;
use crate::source::{ChannelRef, ChannelRefError};
use teloxide::utils::command::BotCommands;
use thiserror::Error;

/// Bot commands
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Welcome message
    #[command(description = "show what this bot does.")]
    Start,
    /// Command list
    #[command(description = "show this help.")]
    Help,
    /// Batch relay request; arguments are validated by [`parse_relay_request`]
    #[command(description = "relay the oldest videos of a channel: /relay <channel> <count>")]
    Relay(String),
}

/// Why a `/relay` request was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The invoker is not the authorized user
    #[error("⛔️ Access denied")]
    Unauthorized,
    /// Wrong number of arguments
    #[error("Usage: /relay <channel> <count>")]
    Usage,
    /// The channel argument is not a channel identifier
    #[error("❌ {0}")]
    Channel(#[from] ChannelRefError),
    /// The count is not an integer in the accepted range
    #[error("❌ Count must be a number between 1 and {max}, got {0:?}", max = MAX_BATCH_COUNT)]
    Count(String),
}

/// Validate a `/relay` request.
///
/// Authorization is checked before the arguments, so an unauthorized user
/// learns nothing about the expected syntax.
///
/// # Errors
///
/// Returns the [`Rejection`] to send back to the invoker.
pub fn parse_relay_request(
    invoker: i64,
    authorized: Option<i64>,
    args: &str,
) -> Result<RelayJob, Rejection> {
    if authorized != Some(invoker) {
        return Err(Rejection::Unauthorized);
    }

    let parts: Vec<&str> = args.split_whitespace().collect();
    let [channel, count] = parts.as_slice() else {
        return Err(Rejection::Usage);
    };

    let channel: ChannelRef = channel.parse()?;
    let count = count
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=MAX_BATCH_COUNT).contains(n))
        .ok_or_else(|| Rejection::Count((*count).to_string()))?;

    Ok(RelayJob {
        channel,
        count: count as usize,
        invoker,
    })
}
