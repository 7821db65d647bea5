use super::{video_content_type, UploadError, UploadReceipt, Uploader};
use crate::config::Settings;
use crate::utils::truncate_str;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

/// Page video upload settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// API base URL, without trailing slash
    pub api_url: String,
    /// Page receiving the videos
    pub page_id: String,
    /// Page access token
    pub access_token: String,
    /// Description attached to every video
    pub description: String,
    /// Timeout of one upload request
    pub timeout: Duration,
}

impl GraphConfig {
    /// Read the Graph values from settings
    ///
    /// # Errors
    ///
    /// Returns `UploadError::Config` if the page ID or access token is missing.
    pub fn from_settings(settings: &Settings) -> Result<Self, UploadError> {
        let page_id = settings
            .graph_page_id
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| UploadError::Config("GRAPH_PAGE_ID is missing".into()))?;
        let access_token = settings
            .graph_access_token
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| UploadError::Config("GRAPH_ACCESS_TOKEN is missing".into()))?;

        Ok(Self {
            api_url: settings.graph_api_url.trim_end_matches('/').to_string(),
            page_id,
            access_token,
            description: settings.graph_description.clone(),
            timeout: Duration::from_secs(settings.upload_http_timeout_secs),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/videos", self.api_url, self.page_id)
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

/// Publishes videos to a page through a multipart POST
pub struct GraphDestination {
    client: Client,
    config: GraphConfig,
}

impl GraphDestination {
    /// Create a destination with its own HTTP client
    ///
    /// # Errors
    ///
    /// Returns `UploadError::Config` if the HTTP client cannot be built.
    pub fn new(config: GraphConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UploadError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn form(&self, path: &Path) -> Result<Form, UploadError> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4")
            .to_string();
        let title = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let source = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), size)
            .file_name(file_name)
            .mime_str(video_content_type(path))?;

        Ok(Form::new()
            .text("access_token", self.config.access_token.clone())
            .text("title", title)
            .text("description", self.config.description.clone())
            .part("source", source))
    }
}

#[async_trait]
impl Uploader for GraphDestination {
    fn name(&self) -> &'static str {
        "graph"
    }

    async fn upload(&self, path: &Path) -> Result<UploadReceipt, UploadError> {
        let form = self.form(path).await?;
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(self.config.endpoint())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), page_id = %self.config.page_id, "Graph upload rejected");
            return Err(UploadError::Status {
                status: status.as_u16(),
                body: truncate_str(&body, 500),
            });
        }

        let body = response.text().await?;
        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| UploadError::InvalidResponse(format!("{e}: {}", truncate_str(&body, 200))))?;

        info!(
            video_id = %parsed.id,
            page_id = %self.config.page_id,
            duration_ms = start.elapsed().as_millis(),
            "Published video"
        );
        Ok(UploadReceipt {
            remote_id: parsed.id,
            link: None,
        })
    }
}
