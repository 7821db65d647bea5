use super::{ChannelRef, SourceError, SourceMessage, SourceSession};
use crate::relay::{BatchObserver, BatchStage};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Posts requested per history page
pub const HISTORY_PAGE_SIZE: usize = 100;

/// Files produced by a history scan
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Downloaded files, in download order
    pub downloaded: Vec<PathBuf>,
    /// Labels of videos whose download failed
    pub failed: Vec<String>,
}

impl FetchReport {
    /// Videos the scan tried to download
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.downloaded.len() + self.failed.len()
    }

    /// True when the scan found no video at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }
}

/// The `count` oldest video posts of `channel`.
///
/// History is read page by page and the scan stops as soon as enough videos
/// are found, so only the pages needed are requested.
///
/// # Errors
///
/// Returns an error if a history page cannot be read.
pub async fn select_videos(
    source: &dyn SourceSession,
    channel: &ChannelRef,
    count: usize,
) -> Result<Vec<SourceMessage>, SourceError> {
    let mut videos = Vec::new();
    let mut cursor = 0;
    while videos.len() < count {
        let page = source.history(channel, cursor, HISTORY_PAGE_SIZE).await?;
        debug!(channel = %channel, after = cursor, posts = page.messages.len(), "History page");
        let wanted = count - videos.len();
        videos.extend(
            page.messages
                .into_iter()
                .filter(|message| message.video.is_some())
                .take(wanted),
        );
        match page.next {
            Some(next) if next > cursor => cursor = next,
            _ => break,
        }
    }
    Ok(videos)
}

/// Download up to `count` videos of `channel`, oldest first, into `dir`.
///
/// Posts without a video are skipped and do not count. A failed download is
/// logged, recorded in [`FetchReport::failed`], and counts toward `count`.
///
/// # Errors
///
/// Returns an error only if the channel history cannot be read.
pub async fn fetch_videos(
    source: &dyn SourceSession,
    channel: &ChannelRef,
    count: usize,
    dir: &Path,
    observer: &dyn BatchObserver,
) -> Result<FetchReport, SourceError> {
    let videos = select_videos(source, channel, count).await?;
    info!(channel = %channel, found = videos.len(), requested = count, "Scanned history");

    let total = videos.len();
    let mut report = FetchReport::default();
    for (done, message) in videos.iter().enumerate() {
        observer.stage(BatchStage::Downloading { done, total }).await;
        match source.download(message, dir).await {
            Ok(path) => report.downloaded.push(path),
            Err(e) => {
                warn!(message_id = message.message_id, error = %e, "Download failed");
                report.failed.push(message.label());
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::progress::SilentObserver;
    use crate::source::{ChatIdentity, HistoryPage, MockSourceSession, VideoFile};
    use mockall::predicate::{always, eq};
    use mockall::Sequence;

    fn post(message_id: i32, video: bool) -> SourceMessage {
        SourceMessage {
            chat: ChatIdentity {
                id: -100_7,
                username: None,
            },
            message_id,
            video: video.then(|| VideoFile {
                file_id: format!("file-{message_id}"),
                file_name: None,
                mime_type: Some("video/mp4".into()),
                size: 10,
            }),
        }
    }

    fn whole(messages: Vec<SourceMessage>) -> HistoryPage {
        HistoryPage {
            messages,
            next: None,
        }
    }

    #[tokio::test]
    async fn test_takes_oldest_videos_only() -> Result<(), Box<dyn std::error::Error>> {
        let mut source = MockSourceSession::new();
        source.expect_history().returning(|_, _, _| {
            Ok(whole(vec![post(1, false), post(2, true), post(3, true), post(4, true)]))
        });
        source
            .expect_download()
            .with(always(), always())
            .times(2)
            .returning(|message, dir| Ok(dir.join(format!("incoming-{}", message.message_id))));

        let dir = PathBuf::from("staging");
        let report = fetch_videos(&source, &ChannelRef::Id(-100_7), 2, &dir, &SilentObserver).await?;

        assert_eq!(
            report.downloaded,
            vec![dir.join("incoming-2"), dir.join("incoming-3")]
        );
        assert!(report.failed.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_download_counts_toward_limit() -> Result<(), Box<dyn std::error::Error>> {
        let mut source = MockSourceSession::new();
        source
            .expect_history()
            .returning(|_, _, _| Ok(whole(vec![post(1, true), post(2, true), post(3, true)])));
        source.expect_download().times(2).returning(|message, dir| {
            if message.message_id == 1 {
                Err(SourceError::Download("timeout".into()))
            } else {
                Ok(dir.join("ok"))
            }
        });

        let report =
            fetch_videos(&source, &ChannelRef::Id(-100_7), 2, Path::new("d"), &SilentObserver)
                .await?;

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.failed, vec!["message #1 (download failed)".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_history() -> Result<(), Box<dyn std::error::Error>> {
        let mut source = MockSourceSession::new();
        source
            .expect_history()
            .returning(|_, _, _| Ok(whole(vec![post(1, false)])));
        source.expect_download().never();

        let report =
            fetch_videos(&source, &ChannelRef::Id(-100_7), 5, Path::new("d"), &SilentObserver)
                .await?;
        assert!(report.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_follows_pages_until_enough_videos() -> Result<(), Box<dyn std::error::Error>> {
        let mut source = MockSourceSession::new();
        let mut seq = Sequence::new();
        source
            .expect_history()
            .with(always(), eq(0), eq(HISTORY_PAGE_SIZE))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| {
                Ok(HistoryPage {
                    messages: vec![post(1, false), post(2, true)],
                    next: Some(100),
                })
            });
        // A page of deleted posts still moves the cursor on
        source
            .expect_history()
            .with(always(), eq(100), eq(HISTORY_PAGE_SIZE))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| {
                Ok(HistoryPage {
                    messages: Vec::new(),
                    next: Some(200),
                })
            });
        source
            .expect_history()
            .with(always(), eq(200), eq(HISTORY_PAGE_SIZE))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| {
                Ok(HistoryPage {
                    messages: vec![post(201, true), post(202, true)],
                    next: Some(300),
                })
            });

        let videos = select_videos(&source, &ChannelRef::Id(-100_7), 2).await?;
        let ids: Vec<_> = videos.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![2, 201]);
        Ok(())
    }
}
