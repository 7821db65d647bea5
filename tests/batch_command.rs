use std::sync::Arc;
use std::time::Duration;
use vidrelay::bot::{AppState, BatchRunner, Rejection, RelayDecision};
use vidrelay::config::RelayMode;
use vidrelay::relay::{BatchRelay, Pacing};
use vidrelay::source::{ChannelLog, SourceSession};
use vidrelay::testing::{test_settings, FakeSource, RecordingObserver, ScriptedUploader};

const OWNER: i64 = 77;
const CHANNEL: i64 = -100_555;

fn batch_state(source: Arc<FakeSource>, root: &std::path::Path) -> AppState {
    let mut settings = test_settings();
    settings.relay_mode = RelayMode::Batch;
    settings.authorized_user_id = Some(OWNER);

    let source: Arc<dyn SourceSession> = source;
    let relay = BatchRelay::new(
        source,
        Arc::new(ScriptedUploader::default()),
        Pacing {
            upload_delay: Duration::from_secs(60),
            idle_interval: Duration::from_secs(3),
        },
        "Trip".into(),
        root.to_path_buf(),
    );
    AppState {
        settings: Arc::new(settings),
        log: Arc::new(ChannelLog::new(10)),
        live: None,
        batch: Some(Arc::new(BatchRunner::new(relay))),
    }
}

fn two_videos() -> Arc<FakeSource> {
    Arc::new(FakeSource::new(vec![
        FakeSource::video_post(CHANNEL, 1, None),
        FakeSource::video_post(CHANNEL, 2, None),
    ]))
}

#[tokio::test]
async fn rejected_requests_download_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let source = two_videos();
    let state = batch_state(source.clone(), root.path());

    assert!(matches!(
        state.decide_relay(OWNER + 1, "-100555 2"),
        RelayDecision::Rejected(Rejection::Unauthorized)
    ));
    assert!(matches!(
        state.decide_relay(OWNER, "-100555 301"),
        RelayDecision::Rejected(Rejection::Count(_))
    ));
    assert!(matches!(
        state.decide_relay(OWNER, "-100555"),
        RelayDecision::Rejected(Rejection::Usage)
    ));

    assert!(source.downloads().is_empty());
    assert_eq!(std::fs::read_dir(root.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn second_request_while_running_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let source = two_videos();
    let state = batch_state(source.clone(), root.path());

    let RelayDecision::Accepted(first) = state.decide_relay(OWNER, "-100555 2") else {
        return Err("first request should be accepted".into());
    };
    assert!(matches!(
        state.decide_relay(OWNER, "-100555 2"),
        RelayDecision::AlreadyRunning
    ));
    assert!(source.downloads().is_empty());

    drop(first);
    assert!(matches!(
        state.decide_relay(OWNER, "-100555 2"),
        RelayDecision::Accepted(_)
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn spawned_run_holds_the_runner_until_done() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let source = two_videos();
    let state = batch_state(source.clone(), root.path());

    let RelayDecision::Accepted(accepted) = state.decide_relay(OWNER, "-100555 2") else {
        return Err("request should be accepted".into());
    };
    let run = tokio::spawn(async move { accepted.run(&RecordingObserver::default()).await });

    assert!(matches!(
        state.decide_relay(OWNER, "-100555 2"),
        RelayDecision::AlreadyRunning
    ));

    let messages = run.await?;
    assert_eq!(messages, vec!["✅ Uploaded: 2/2".to_string()]);
    assert_eq!(source.downloads(), vec![1, 2]);
    assert!(matches!(
        state.decide_relay(OWNER, "-100555 2"),
        RelayDecision::Accepted(_)
    ));
    Ok(())
}

#[tokio::test]
async fn live_mode_refuses_batch_requests() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let source = two_videos();
    let mut state = batch_state(source.clone(), root.path());
    state.batch = None;

    assert!(matches!(
        state.decide_relay(OWNER, "-100555 2"),
        RelayDecision::Disabled
    ));
    assert!(source.downloads().is_empty());
    Ok(())
}
