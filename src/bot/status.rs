//! Status message of a batch run.
//!
//! One message is sent when the run starts and edited as the run moves
//! through its stages, ending with the summary.

use super::resilient::{edit_message_safe_resilient, MAX_MESSAGE_CHARS};
use crate::relay::{BatchObserver, BatchStage, RelayError, RelaySummary};
use crate::source::ChannelRef;
use crate::utils::{escape_html, split_long_message, truncate_str};
use async_trait::async_trait;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum gap between two "downloading" edits
const DOWNLOAD_EDIT_INTERVAL: Duration = Duration::from_secs(2);

/// Longest error message shown to the user
const ERROR_PREVIEW_CHARS: usize = 300;

/// Text shown when the run starts
#[must_use]
pub fn render_started(channel: &ChannelRef, count: usize) -> String {
    format!(
        "⏳ Relaying up to {count} videos from <b>{}</b>…",
        escape_html(&channel.to_string())
    )
}

/// Text for a stage update
#[must_use]
pub fn render_stage(stage: &BatchStage) -> String {
    match stage {
        BatchStage::Downloading { done, total } => {
            format!("📥 Downloading videos: {done}/{total}")
        }
        BatchStage::Renaming { count } => format!("✏️ Renaming {count} files…"),
        BatchStage::Uploading {
            current,
            total,
            file,
        } => format!(
            "📤 Uploading {current}/{total}: <code>{}</code>",
            escape_html(file)
        ),
    }
}

/// Final report of a completed run.
///
/// The first message is the headline shown in the status message. Failed
/// items follow in as many messages as needed; none are dropped.
#[must_use]
pub fn render_summary(summary: &RelaySummary) -> Vec<String> {
    if summary.is_clean() {
        return vec![format!(
            "✅ Uploaded: {}/{}",
            summary.uploaded_count(),
            summary.total
        )];
    }

    let mut messages = vec![format!(
        "⚠️ Uploaded: {}/{}\nFailed: {}",
        summary.uploaded_count(),
        summary.total,
        summary.failed.len()
    )];
    let mut list = format!("Failed ({}):", summary.failed.len());
    for name in &summary.failed {
        list.push_str("\n• ");
        list.push_str(&escape_html(name));
    }
    messages.extend(split_long_message(&list, MAX_MESSAGE_CHARS));
    messages
}

/// Final report of a run that found nothing
#[must_use]
pub fn render_no_videos(channel: &ChannelRef) -> String {
    format!(
        "ℹ️ No videos found in <b>{}</b>",
        escape_html(&channel.to_string())
    )
}

/// Final report of a run aborted by an error
#[must_use]
pub fn render_failure(error: &RelayError) -> String {
    format!(
        "❌ {}: {}",
        error.kind(),
        escape_html(&truncate_str(error.to_string(), ERROR_PREVIEW_CHARS))
    )
}

/// Batch observer editing one Telegram message
pub struct StatusMessage {
    bot: Bot,
    chat_id: ChatId,
    message_id: MessageId,
    last_download_edit: Mutex<Option<Instant>>,
}

impl StatusMessage {
    /// Observer editing `message_id` in `chat_id`
    #[must_use]
    pub fn new(bot: Bot, chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            message_id,
            last_download_edit: Mutex::new(None),
        }
    }

    /// Replace the message text
    pub async fn show(&self, text: &str) -> bool {
        edit_message_safe_resilient(&self.bot, self.chat_id, self.message_id, text).await
    }
}

#[async_trait]
impl BatchObserver for StatusMessage {
    async fn stage(&self, stage: BatchStage) {
        if matches!(stage, BatchStage::Downloading { .. }) {
            let mut last = self.last_download_edit.lock().await;
            if last.is_some_and(|at| at.elapsed() < DOWNLOAD_EDIT_INTERVAL) {
                return;
            }
            *last = Some(Instant::now());
        }
        self.show(&render_stage(&stage)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_render_stage() {
        assert_eq!(
            render_stage(&BatchStage::Downloading { done: 2, total: 5 }),
            "📥 Downloading videos: 2/5"
        );
        assert_eq!(
            render_stage(&BatchStage::Uploading {
                current: 1,
                total: 3,
                file: "a<b>.mp4".into(),
            }),
            "📤 Uploading 1/3: <code>a&lt;b&gt;.mp4</code>"
        );
    }

    #[test]
    fn test_render_summary_lists_failures() {
        let mut summary = RelaySummary::new(3);
        summary.uploaded.push("My vlog 1.mp4".into());
        summary.uploaded.push("My vlog 3.mp4".into());
        summary.record_failure("My vlog 2.mp4");

        assert_eq!(
            render_summary(&summary),
            vec![
                "⚠️ Uploaded: 2/3\nFailed: 1".to_string(),
                "Failed (1):\n• My vlog 2.mp4".to_string(),
            ]
        );
    }

    #[test]
    fn test_render_clean_summary() {
        let mut summary = RelaySummary::new(1);
        summary.uploaded.push("My vlog 1.mp4".into());
        assert_eq!(render_summary(&summary), vec!["✅ Uploaded: 1/1".to_string()]);
    }

    #[test]
    fn test_render_summary_keeps_every_failed_name() {
        let mut summary = RelaySummary::new(300);
        for i in 1..=300 {
            summary.record_failure(format!("Tom & Jerry {i}.mp4"));
        }

        let messages = render_summary(&summary);
        assert_eq!(messages[0], "⚠️ Uploaded: 0/300\nFailed: 300");
        assert!(messages.len() > 2);

        let lines: Vec<&str> = messages[1..]
            .iter()
            .inspect(|part| {
                assert!(part.len() <= MAX_MESSAGE_CHARS);
                assert_eq!(part.matches('&').count(), part.matches("&amp;").count());
            })
            .flat_map(|part| part.lines())
            .filter(|line| line.starts_with("• "))
            .collect();
        assert_eq!(lines.len(), 300);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(*line, format!("• Tom &amp; Jerry {}.mp4", i + 1));
        }
    }

    #[test]
    fn test_render_failure_truncates() {
        let error = RelayError::Rename {
            from: PathBuf::from("x".repeat(400)),
            to: PathBuf::from("My vlog 1.mp4"),
            source: std::io::Error::other("denied"),
        };
        let text = render_failure(&error);
        assert!(text.starts_with("❌ RenameError: failed to rename "));
        assert!(text.chars().count() <= "❌ RenameError: ".chars().count() + ERROR_PREVIEW_CHARS);
    }

    #[test]
    fn test_render_no_videos() {
        assert_eq!(
            render_no_videos(&ChannelRef::Username("chan_x".into())),
            "ℹ️ No videos found in <b>@chan_x</b>"
        );
    }
}
