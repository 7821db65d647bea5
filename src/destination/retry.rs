use super::{UploadError, UploadReceipt, Uploader};
use crate::config::{Settings, UPLOAD_RETRY_INITIAL_BACKOFF_MS, UPLOAD_RETRY_MAX_BACKOFF_MS};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

/// How often a failed upload is attempted again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per file; 1 disables retrying
    pub max_attempts: usize,
    /// Delay before the first retry
    pub initial_backoff_ms: u64,
    /// Upper bound of a single delay
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: UPLOAD_RETRY_INITIAL_BACKOFF_MS,
            max_backoff_ms: UPLOAD_RETRY_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Policy configured by `UPLOAD_MAX_ATTEMPTS`
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.upload_max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delays between attempts: doubling from `initial_backoff_ms`, capped,
    /// with jitter
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        // from_millis(2) yields 2, 4, 8…; the factor scales that to initial, 2×initial…
        ExponentialBackoff::from_millis(2)
            .factor((self.initial_backoff_ms / 2).max(1))
            .max_delay(Duration::from_millis(self.max_backoff_ms))
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1))
    }
}

/// Retries a failed upload according to a [`RetryPolicy`]
pub struct RetryingUploader<U> {
    inner: U,
    policy: RetryPolicy,
}

impl<U: Uploader> RetryingUploader<U> {
    /// Wrap `inner`
    #[must_use]
    pub const fn new(inner: U, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<U: Uploader> Uploader for RetryingUploader<U> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn upload(&self, path: &Path) -> Result<UploadReceipt, UploadError> {
        if self.policy.max_attempts <= 1 {
            return self.inner.upload(path).await;
        }

        let attempt = AtomicUsize::new(0);
        Retry::spawn(self.policy.delays(), || async {
            let n = attempt.fetch_add(1, Ordering::Relaxed) + 1;
            self.inner.upload(path).await.inspect_err(|e| {
                warn!(
                    destination = self.inner.name(),
                    attempt = n,
                    max_attempts = self.policy.max_attempts,
                    error = %e,
                    "Upload attempt failed"
                );
            })
        })
        .await
    }
}
