use super::{video_content_type, UploadError, UploadReceipt, Uploader};
use crate::config::{Settings, STORAGE_CHUNK_SIZE};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use aws_types::region::Region;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Connection values of an S3-compatible bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    /// Bucket name
    pub bucket: String,
    /// Custom endpoint (R2, MinIO, …); AWS when `None`
    pub endpoint_url: Option<String>,
    /// Signing region
    pub region: String,
    /// Explicit key pair; the default credential chain is used when `None`
    pub credentials: Option<(String, String)>,
    /// Key prefix, e.g. `videos/`
    pub prefix: String,
    /// Lifetime of the presigned download link
    pub link_ttl: Duration,
    /// Files larger than this are sent as multipart uploads of this part size
    pub part_size: usize,
}

impl S3Config {
    /// Read the storage values from settings
    ///
    /// # Errors
    ///
    /// Returns `UploadError::Config` if the bucket name is missing.
    pub fn from_settings(settings: &Settings) -> Result<Self, UploadError> {
        let bucket = settings
            .storage_bucket_name
            .clone()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| UploadError::Config("STORAGE_BUCKET_NAME is missing".into()))?;

        let credentials = settings
            .storage_access_key_id
            .clone()
            .zip(settings.storage_secret_access_key.clone())
            .filter(|(id, secret)| !id.trim().is_empty() && !secret.trim().is_empty());

        Ok(Self {
            bucket,
            endpoint_url: settings.storage_endpoint_url.clone(),
            region: settings.storage_region.clone(),
            credentials,
            prefix: settings.storage_prefix.clone().unwrap_or_default(),
            link_ttl: Duration::from_secs(settings.storage_link_ttl_secs),
            part_size: STORAGE_CHUNK_SIZE,
        })
    }

    /// Object key of a staged file
    #[must_use]
    pub fn object_key(&self, file_name: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{prefix}/{file_name}")
        }
    }
}

/// Uploads staged files to an S3-compatible bucket
pub struct S3Destination {
    config: S3Config,
    client: OnceCell<Client>,
}

impl S3Destination {
    /// Create a destination; the client is built on first upload
    #[must_use]
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(self.config.region.clone()));
                if let Some((access_key, secret_key)) = &self.config.credentials {
                    loader = loader.credentials_provider(Credentials::new(
                        access_key,
                        secret_key,
                        None,
                        None,
                        "vidrelay-storage",
                    ));
                }
                let sdk_config = loader.load().await;

                let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
                if let Some(endpoint) = &self.config.endpoint_url {
                    builder = builder.endpoint_url(endpoint).force_path_style(true);
                }
                Client::from_conf(builder.build())
            })
            .await
    }

    async fn put_single(&self, key: &str, path: &Path) -> Result<(), UploadError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;
        self.client()
            .await
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(video_content_type(path))
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Storage(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn put_multipart(&self, key: &str, path: &Path) -> Result<(), UploadError> {
        let client = self.client().await;
        let created = client
            .create_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(video_content_type(path))
            .send()
            .await
            .map_err(|e| UploadError::Storage(DisplayErrorContext(&e).to_string()))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| UploadError::Storage("no upload ID returned".into()))?
            .to_string();

        match self.send_parts(client, key, &upload_id, path).await {
            Ok(parts) => {
                client
                    .complete_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| UploadError::Storage(DisplayErrorContext(&e).to_string()))?;
                Ok(())
            }
            Err(e) => {
                // Incomplete uploads are billed until aborted
                if let Err(abort) = client
                    .abort_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key, error = %DisplayErrorContext(&abort), "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn send_parts(
        &self,
        client: &Client,
        key: &str,
        upload_id: &str,
        path: &Path,
    ) -> Result<Vec<CompletedPart>, UploadError> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut buffer = vec![0u8; self.config.part_size];
        let mut parts = Vec::new();
        let mut part_number = 1;

        loop {
            let filled = read_chunk(&mut file, &mut buffer).await?;
            if filled == 0 {
                break;
            }

            let uploaded = client
                .upload_part()
                .bucket(&self.config.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buffer[..filled].to_vec()))
                .send()
                .await
                .map_err(|e| {
                    error!(key, part_number, "Failed to upload part");
                    UploadError::Storage(DisplayErrorContext(&e).to_string())
                })?;
            let etag = uploaded.e_tag().ok_or_else(|| {
                UploadError::Storage(format!("no ETag returned for part {part_number}"))
            })?;
            debug!(key, part_number, bytes = filled, "Uploaded part");

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );
            part_number += 1;

            if filled < buffer.len() {
                break;
            }
        }

        Ok(parts)
    }

    async fn presigned_link(&self, key: &str) -> Option<String> {
        let presigning = match PresigningConfig::expires_in(self.config.link_ttl) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Invalid link lifetime");
                return None;
            }
        };
        match self
            .client()
            .await
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .presigned(presigning)
            .await
        {
            Ok(request) => Some(request.uri().to_string()),
            Err(e) => {
                warn!(key, error = %DisplayErrorContext(&e), "Failed to presign download link");
                None
            }
        }
    }
}

#[async_trait]
impl Uploader for S3Destination {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn upload(&self, path: &Path) -> Result<UploadReceipt, UploadError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::Config(format!("invalid file name: {}", path.display())))?;
        let key = self.config.object_key(file_name);
        let size = tokio::fs::metadata(path).await?.len();
        let start = std::time::Instant::now();

        if size > self.config.part_size as u64 {
            self.put_multipart(&key, path).await?;
        } else {
            self.put_single(&key, path).await?;
        }

        info!(
            bucket = %self.config.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_millis(),
            "Stored object"
        );

        Ok(UploadReceipt {
            link: self.presigned_link(&key).await,
            remote_id: key,
        })
    }
}

/// Fill `buffer` from `reader`; a short count means end of input.
async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    buffer: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_settings;

    #[test]
    fn test_config_from_settings() -> Result<(), Box<dyn std::error::Error>> {
        let mut settings = test_settings();
        settings.storage_prefix = Some("/vlogs/".into());
        settings.storage_access_key_id = Some("id".into());
        settings.storage_secret_access_key = Some("secret".into());

        let config = S3Config::from_settings(&settings)?;
        assert_eq!(config.bucket, "videos");
        assert_eq!(config.credentials, Some(("id".into(), "secret".into())));
        assert_eq!(config.object_key("My vlog 1.mp4"), "vlogs/My vlog 1.mp4");
        assert_eq!(config.part_size, STORAGE_CHUNK_SIZE);
        Ok(())
    }

    #[test]
    fn test_missing_bucket_is_config_error() {
        let mut settings = test_settings();
        settings.storage_bucket_name = Some("  ".into());
        assert!(matches!(
            S3Config::from_settings(&settings),
            Err(UploadError::Config(_))
        ));
    }

    #[test]
    fn test_object_key_without_prefix() -> Result<(), Box<dyn std::error::Error>> {
        let config = S3Config::from_settings(&test_settings())?;
        assert_eq!(config.object_key("My vlog 3.mov"), "My vlog 3.mov");
        Ok(())
    }

    #[tokio::test]
    async fn test_read_chunk_splits_input() -> std::io::Result<()> {
        let data = vec![7u8; 25];
        let mut reader = data.as_slice();
        let mut buffer = vec![0u8; 10];

        let mut sizes = Vec::new();
        loop {
            let n = read_chunk(&mut reader, &mut buffer).await?;
            sizes.push(n);
            if n < buffer.len() {
                break;
            }
        }
        assert_eq!(sizes, vec![10, 10, 5]);
        Ok(())
    }

}
