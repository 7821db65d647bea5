//! Small helpers shared by the bot and the destinations.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use vidrelay::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Split a message into parts no longer than `max_length` bytes.
///
/// Parts break at line boundaries, so escaped HTML entities and one-line
/// tags stay whole. A single line longer than the limit is cut between
/// grapheme clusters.
///
/// # Examples
///
/// ```
/// use vidrelay::utils::split_long_message;
/// let long_msg = "• My vlog 1.mp4\n".repeat(600);
/// let parts = split_long_message(&long_msg, 4000);
/// assert!(parts.len() > 1);
/// assert!(parts.iter().all(|p| p.len() <= 4000));
/// ```
#[must_use]
pub fn split_long_message(message: &str, max_length: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }
    if message.len() <= max_length {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for line in message.lines() {
        if line.len() > max_length {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            let mut chunk = String::new();
            for grapheme in line.graphemes(true) {
                if chunk.len() + grapheme.len() > max_length {
                    parts.push(std::mem::take(&mut chunk));
                }
                chunk.push_str(grapheme);
            }
            current = chunk;
            continue;
        }

        let separator = usize::from(!current.is_empty());
        if current.len() + separator + line.len() > max_length {
            parts.push(std::mem::take(&mut current));
        } else if separator == 1 {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Escape text for Telegram's HTML parse mode
#[must_use]
pub fn escape_html(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

/// Retry a Telegram API operation with exponential backoff.
///
/// Meant for file lookups and message sends that may fail on transient
/// network errors. Delays start at 500 ms, are capped at 4 s and carry
/// jitter; at most 3 retries follow the first attempt.
///
/// # Errors
///
/// Returns the last error once every attempt has failed.
///
/// # Examples
///
/// ```no_run
/// use vidrelay::utils::retry_telegram_operation;
/// use anyhow::Result;
///
/// async fn lookup() -> Result<String> {
///     Ok(String::new())
/// }
///
/// # async fn example() -> Result<()> {
/// let path = retry_telegram_operation(|| async { lookup().await }).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(2)
        .factor(TELEGRAM_API_INITIAL_BACKOFF_MS / 2)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES + 1,
            e
        );
        e
    })
}
