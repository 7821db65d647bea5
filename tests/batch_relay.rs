use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use vidrelay::relay::{BatchRelay, BatchReport, BatchStage, Pacing, RelayJob};
use vidrelay::source::{ChannelRef, SourceSession};
use vidrelay::testing::{FakeSource, RecordingObserver, ScriptedUploader};

const CHANNEL: i64 = -100_555;

fn pacing() -> Pacing {
    Pacing {
        upload_delay: Duration::from_secs(60),
        idle_interval: Duration::from_secs(3),
    }
}

fn job(count: usize) -> RelayJob {
    RelayJob {
        channel: ChannelRef::Id(CHANNEL),
        count,
        invoker: 1,
    }
}

fn batch(source: Arc<FakeSource>, uploader: Arc<ScriptedUploader>, root: &Path) -> BatchRelay {
    let source: Arc<dyn SourceSession> = source;
    BatchRelay::new(source, uploader, pacing(), "Trip".into(), root.to_path_buf())
}

fn files_below(root: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path: PathBuf = entry.path();
            if path.is_dir() {
                dirs.push(path);
            } else {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }
    names.sort();
    names
}

#[tokio::test(start_paused = true)]
async fn three_videos_with_one_upload_failure() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let source = Arc::new(FakeSource::new(vec![
        FakeSource::video_post(CHANNEL, 1, Some("beach.mp4")),
        FakeSource::text_post(CHANNEL, 2),
        FakeSource::video_post(CHANNEL, 3, Some("hike.mov")),
        FakeSource::video_post(CHANNEL, 4, None),
        FakeSource::video_post(-100_999, 5, Some("other.mp4")),
    ]));
    let uploader = Arc::new(ScriptedUploader::failing_on(["Trip 2.mov"]));

    let report = batch(source, uploader.clone(), root.path())
        .run(&job(3), &RecordingObserver::default())
        .await?;

    let BatchReport::Completed(summary) = report else {
        return Err("expected a completed run".into());
    };
    assert_eq!(summary.to_string(), "Uploaded: 2/3\nFailed (1):\n• Trip 2.mov");
    assert_eq!(
        uploader.uploaded_names(),
        vec!["Trip 1.mp4", "Trip 2.mov", "Trip 3.mp4"]
    );
    assert_eq!(files_below(root.path()), vec!["Trip 2.mov"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn uploads_are_paced_and_sequential() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let source = Arc::new(FakeSource::new(
        (1..=3)
            .map(|id| FakeSource::video_post(CHANNEL, id, None))
            .collect(),
    ));
    let uploader = Arc::new(ScriptedUploader::default());

    batch(source, uploader.clone(), root.path())
        .run(&job(3), &RecordingObserver::default())
        .await?;

    let starts = uploader.starts();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        assert!(pair[1].1.duration_since(pair[0].1) >= Duration::from_secs(60));
    }
    Ok(())
}

#[tokio::test]
async fn no_videos_leaves_nothing_behind() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let source = Arc::new(FakeSource::new(vec![
        FakeSource::text_post(CHANNEL, 1),
        FakeSource::text_post(CHANNEL, 2),
    ]));
    let uploader = Arc::new(ScriptedUploader::default());
    let observer = RecordingObserver::default();

    let report = batch(source, uploader.clone(), root.path())
        .run(&job(5), &observer)
        .await?;

    assert_eq!(report, BatchReport::NoVideos);
    assert!(uploader.uploaded_names().is_empty());
    assert!(observer.stages().is_empty());
    assert_eq!(std::fs::read_dir(root.path())?.count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn takes_oldest_videos_up_to_count() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let source = Arc::new(FakeSource::new(
        (1..=5)
            .map(|id| FakeSource::video_post(CHANNEL, id, None))
            .collect(),
    ));
    let uploader = Arc::new(ScriptedUploader::default());

    let report = batch(source.clone(), uploader.clone(), root.path())
        .run(&job(2), &RecordingObserver::default())
        .await?;

    assert_eq!(source.downloads(), vec![1, 2]);
    assert_eq!(uploader.uploaded_names(), vec!["Trip 1.mp4", "Trip 2.mp4"]);
    let BatchReport::Completed(summary) = report else {
        return Err("expected a completed run".into());
    };
    assert!(summary.is_clean());
    assert!(files_below(root.path()).is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_download_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let source = Arc::new(
        FakeSource::new(vec![
            FakeSource::video_post(CHANNEL, 1, None),
            FakeSource::video_post(CHANNEL, 2, None),
        ])
        .with_failed_download(1),
    );
    let uploader = Arc::new(ScriptedUploader::default());

    let report = batch(source, uploader.clone(), root.path())
        .run(&job(2), &RecordingObserver::default())
        .await?;

    let BatchReport::Completed(summary) = report else {
        return Err("expected a completed run".into());
    };
    assert_eq!(summary.total, 2);
    assert_eq!(summary.uploaded, vec!["Trip 1.mp4".to_string()]);
    assert_eq!(summary.failed, vec!["message #1 (download failed)".to_string()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn observer_sees_every_stage() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let source = Arc::new(FakeSource::new(vec![
        FakeSource::video_post(CHANNEL, 1, Some("a.webm")),
        FakeSource::video_post(CHANNEL, 2, None),
    ]));
    let observer = RecordingObserver::default();

    batch(source, Arc::new(ScriptedUploader::default()), root.path())
        .run(&job(2), &observer)
        .await?;

    assert_eq!(
        observer.stages(),
        vec![
            BatchStage::Downloading { done: 0, total: 2 },
            BatchStage::Downloading { done: 1, total: 2 },
            BatchStage::Renaming { count: 2 },
            BatchStage::Uploading {
                current: 1,
                total: 2,
                file: "Trip 1.webm".into(),
            },
            BatchStage::Uploading {
                current: 2,
                total: 2,
                file: "Trip 2.mp4".into(),
            },
        ]
    );
    Ok(())
}
