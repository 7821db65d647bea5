use std::sync::Arc;
use std::time::Duration;
use vidrelay::relay::{LiveRelay, LiveSession, Pacing, RelayQueue, RelayWorker};
use vidrelay::source::{ChannelRef, SourceSession};
use vidrelay::testing::{FakeSource, ScriptedUploader};

const CHANNEL: i64 = -100_777;

#[tokio::test(start_paused = true)]
async fn live_posts_are_renamed_queued_and_uploaded_in_order(
) -> Result<(), Box<dyn std::error::Error>> {
    let staging = tempfile::tempdir()?;
    let posts = vec![
        FakeSource::video_post(CHANNEL, 10, Some("morning.mov")),
        FakeSource::video_post(CHANNEL, 11, None),
        FakeSource::video_post(CHANNEL, 12, Some("evening.mkv")),
    ];
    let source: Arc<dyn SourceSession> = Arc::new(FakeSource::new(posts.clone()));
    let uploader = Arc::new(ScriptedUploader::default());

    let queue = Arc::new(RelayQueue::new());
    let session = LiveSession::new(staging.path().to_path_buf(), "Day".into(), queue.clone());
    let relay = LiveRelay::new(source, session, Some(ChannelRef::Id(CHANNEL)));

    for post in &posts {
        relay.handle_video(post).await?;
    }
    assert_eq!(relay.session().counter().await, 3);
    assert_eq!(queue.len(), 3);

    let pacing = Pacing {
        upload_delay: Duration::from_secs(60),
        idle_interval: Duration::from_secs(3),
    };
    let worker = tokio::spawn(RelayWorker::new(queue.clone(), uploader.clone(), pacing).run());

    for _ in 0..300 {
        if uploader.uploaded_names().len() == 3 && queue.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    tokio::time::sleep(Duration::from_secs(5)).await;
    worker.abort();

    assert_eq!(
        uploader.uploaded_names(),
        vec!["Day 1.mov", "Day 2.mp4", "Day 3.mkv"]
    );
    let starts = uploader.starts();
    for pair in starts.windows(2) {
        assert!(pair[1].1.duration_since(pair[0].1) >= Duration::from_secs(60));
    }
    assert_eq!(std::fs::read_dir(staging.path())?.count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_live_upload_keeps_file_and_continues() -> Result<(), Box<dyn std::error::Error>> {
    let staging = tempfile::tempdir()?;
    let posts = vec![
        FakeSource::video_post(CHANNEL, 1, None),
        FakeSource::video_post(CHANNEL, 2, None),
    ];
    let source: Arc<dyn SourceSession> = Arc::new(FakeSource::new(posts.clone()));
    let uploader = Arc::new(ScriptedUploader::failing_on(["Day 1.mp4"]));

    let queue = Arc::new(RelayQueue::new());
    let session = LiveSession::new(staging.path().to_path_buf(), "Day".into(), queue.clone());
    let relay = LiveRelay::new(source, session, None);
    for post in &posts {
        relay.handle_video(post).await?;
    }

    let worker = RelayWorker::new(
        queue,
        uploader.clone(),
        Pacing {
            upload_delay: Duration::from_secs(1),
            idle_interval: Duration::from_secs(1),
        },
    );
    let first = worker.process_next().await.ok_or("first attempt")?;
    let second = worker.process_next().await.ok_or("second attempt")?;

    assert!(!first.succeeded());
    assert!(second.succeeded());
    assert!(staging.path().join("Day 1.mp4").exists());
    assert!(!staging.path().join("Day 2.mp4").exists());
    Ok(())
}

#[tokio::test]
async fn download_failure_does_not_consume_an_ordinal() -> Result<(), Box<dyn std::error::Error>> {
    let staging = tempfile::tempdir()?;
    let posts = vec![
        FakeSource::video_post(CHANNEL, 1, None),
        FakeSource::video_post(CHANNEL, 2, None),
    ];
    let source: Arc<dyn SourceSession> =
        Arc::new(FakeSource::new(posts.clone()).with_failed_download(1));

    let queue = Arc::new(RelayQueue::new());
    let session = LiveSession::new(staging.path().to_path_buf(), "Day".into(), queue.clone());
    let relay = LiveRelay::new(source, session, Some(ChannelRef::Id(CHANNEL)));

    assert!(relay.handle_video(&posts[0]).await.is_err());
    let item = relay.handle_video(&posts[1]).await?;

    assert_eq!(item.file_name(), "Day 1.mp4");
    assert_eq!(queue.len(), 1);
    Ok(())
}
