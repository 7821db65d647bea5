use super::command::{parse_relay_request, Rejection};
use super::status::{render_failure, render_no_videos, render_summary};
use crate::config::Settings;
use crate::relay::{BatchObserver, BatchRelay, BatchReport, LiveRelay, RelayJob};
use crate::source::ChannelLog;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

/// Batch relay guarded so that only one run is active at a time
pub struct BatchRunner {
    relay: BatchRelay,
    lock: Arc<Mutex<()>>,
}

impl BatchRunner {
    /// Wrap a batch relay with its lock
    #[must_use]
    pub fn new(relay: BatchRelay) -> Self {
        Self {
            relay,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Claim the runner, or `None` while another run holds it
    #[must_use]
    pub fn try_claim(&self) -> Option<OwnedMutexGuard<()>> {
        self.lock.clone().try_lock_owned().ok()
    }

    /// Run `job` and render the messages reporting its outcome.
    ///
    /// The first message replaces the status message; any others follow it.
    pub async fn execute(&self, job: &RelayJob, observer: &dyn BatchObserver) -> Vec<String> {
        match self.relay.run(job, observer).await {
            Ok(BatchReport::NoVideos) => vec![render_no_videos(&job.channel)],
            Ok(BatchReport::Completed(summary)) => {
                info!(
                    channel = %job.channel,
                    uploaded = summary.uploaded_count(),
                    failed = summary.failed.len(),
                    "Batch relay finished"
                );
                render_summary(&summary)
            }
            Err(e) => {
                error!(channel = %job.channel, kind = e.kind(), error = %e, "Batch relay aborted");
                vec![render_failure(&e)]
            }
        }
    }
}

/// A `/relay` request that passed every check and holds the runner
#[derive(Debug)]
pub struct AcceptedRelay {
    /// Validated request
    pub job: RelayJob,
    runner: Arc<BatchRunner>,
    guard: OwnedMutexGuard<()>,
}

impl AcceptedRelay {
    /// Run the job, releasing the runner when it is done
    pub async fn run(self, observer: &dyn BatchObserver) -> Vec<String> {
        let messages = self.runner.execute(&self.job, observer).await;
        drop(self.guard);
        messages
    }
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner").finish_non_exhaustive()
    }
}

/// What a `/relay` request leads to
#[derive(Debug)]
pub enum RelayDecision {
    /// The request failed validation
    Rejected(Rejection),
    /// The process runs in live mode
    Disabled,
    /// Another run holds the runner
    AlreadyRunning,
    /// Start the run
    Accepted(AcceptedRelay),
}

/// Everything the dispatcher endpoints need
pub struct AppState {
    /// Loaded configuration
    pub settings: Arc<Settings>,
    /// Posts observed so far, served as batch history
    pub log: Arc<ChannelLog>,
    /// Present in live mode
    pub live: Option<Arc<LiveRelay>>,
    /// Present in batch mode
    pub batch: Option<Arc<BatchRunner>>,
}

impl AppState {
    /// Validate a `/relay` request and claim the batch runner for it.
    ///
    /// Nothing is downloaded here; an accepted request starts when
    /// [`AcceptedRelay::run`] is awaited.
    #[must_use]
    pub fn decide_relay(&self, invoker: i64, args: &str) -> RelayDecision {
        let job = match parse_relay_request(invoker, self.settings.authorized_user_id, args) {
            Ok(job) => job,
            Err(rejection) => return RelayDecision::Rejected(rejection),
        };
        let Some(runner) = self.batch.as_ref() else {
            return RelayDecision::Disabled;
        };
        match runner.try_claim() {
            Some(guard) => RelayDecision::Accepted(AcceptedRelay {
                job,
                runner: runner.clone(),
                guard,
            }),
            None => RelayDecision::AlreadyRunning,
        }
    }
}
