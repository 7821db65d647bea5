//! Upload destinations
//!
//! Every destination implements [`Uploader`]: one call uploads one local file
//! and either returns a receipt or an error. Retries are layered on top by
//! [`RetryingUploader`].

use crate::config::{DestinationKind, Settings};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Graph page video upload
pub mod graph;
/// Bounded retry decorator
pub mod retry;
/// S3-compatible object storage
pub mod s3;

pub use graph::{GraphConfig, GraphDestination};
pub use retry::{RetryPolicy, RetryingUploader};
pub use s3::{S3Config, S3Destination};

/// Errors raised while uploading a file
#[derive(Error, Debug)]
pub enum UploadError {
    /// Reading the local file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Object storage rejected a request
    #[error("Storage error: {0}")]
    Storage(String),
    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The remote API answered with an unexpected status
    #[error("API error {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },
    /// The remote API answered with a body we could not use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Destination is misconfigured
    #[error("Configuration error: {0}")]
    Config(String),
}

impl UploadError {
    /// Short label used when reporting the error to the user
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "IoError",
            Self::Storage(_) => "StorageError",
            Self::Http(_) => "HttpError",
            Self::Status { .. } => "ApiError",
            Self::InvalidResponse(_) => "InvalidResponse",
            Self::Config(_) => "ConfigError",
        }
    }
}

/// What the destination returned for an accepted file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Object key or remote video ID
    pub remote_id: String,
    /// Shareable link, when the destination produces one
    pub link: Option<String>,
}

/// A place videos are uploaded to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Short destination name for logs
    fn name(&self) -> &'static str;

    /// Upload the file at `path`
    async fn upload(&self, path: &Path) -> Result<UploadReceipt, UploadError>;
}

/// Build the configured destination, wrapped in the retry policy.
///
/// # Errors
///
/// Returns `UploadError::Config` if a required destination value is missing
/// or the HTTP client cannot be built.
pub fn build_uploader(settings: &Settings) -> Result<Arc<dyn Uploader>, UploadError> {
    let policy = RetryPolicy::from_settings(settings);
    let uploader: Arc<dyn Uploader> = match settings.destination {
        DestinationKind::S3 => Arc::new(RetryingUploader::new(
            S3Destination::new(S3Config::from_settings(settings)?),
            policy,
        )),
        DestinationKind::Graph => Arc::new(RetryingUploader::new(
            GraphDestination::new(GraphConfig::from_settings(settings)?)?,
            policy,
        )),
    };

    info!(
        destination = uploader.name(),
        max_attempts = policy.max_attempts,
        "Upload destination ready"
    );
    Ok(uploader)
}

/// MIME type of a staged video, from its extension
pub(crate) fn video_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("mp4" | "m4v") => "video/mp4",
        _ => "application/octet-stream",
    }
}
