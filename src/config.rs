//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the relay's pacing constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Operating mode of the process
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Relay every new video post as it arrives
    #[default]
    Live,
    /// Relay a bounded slice of channel history on `/relay`
    Batch,
}

/// Telegram session reading channel history and downloading videos
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Bot API: posts observed since startup, 20 MB download cap unless a
    /// local Bot API server is used
    #[default]
    Bot,
    /// MTProto user account: full channel history, no download cap
    User,
}

/// Destination the videos are relayed to
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    /// S3-compatible object storage (AWS S3, Cloudflare R2, `MinIO`)
    #[default]
    S3,
    /// Facebook Graph page video endpoint
    Graph,
}

impl DestinationKind {
    /// Default pause between two consecutive uploads
    #[must_use]
    pub const fn default_upload_delay(self) -> Duration {
        match self {
            Self::S3 => Duration::from_secs(STORAGE_UPLOAD_DELAY_SECS),
            Self::Graph => Duration::from_secs(SOCIAL_UPLOAD_DELAY_SECS),
        }
    }
}

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    #[serde(default)]
    pub telegram_token: String,
    /// Base URL of a local Bot API server (lifts the 20 MB download limit)
    pub telegram_api_url: Option<String>,
    /// HTTP timeout for Telegram requests, downloads included
    #[serde(default = "default_telegram_http_timeout_secs")]
    pub telegram_http_timeout_secs: u64,

    /// Session used for history and downloads
    #[serde(default)]
    pub source_session: SessionKind,
    /// MTProto application ID (user session)
    pub telegram_api_id: Option<i32>,
    /// MTProto application hash (user session)
    pub telegram_api_hash: Option<String>,
    /// Saved user session, base64 encoded
    pub string_session: Option<String>,

    /// Live or batch operation
    #[serde(default)]
    pub relay_mode: RelayMode,
    /// Channel watched in live mode (`@username`, `-100…` id or `t.me` link)
    pub target_channel: Option<String>,
    /// The only Telegram user allowed to run `/relay`
    pub authorized_user_id: Option<i64>,
    /// Prefix of the sequential file names
    #[serde(default = "default_base_name")]
    pub base_name: String,
    /// Directory holding files between download and upload
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Maximum number of posts remembered per process for batch history
    #[serde(default = "default_channel_log_capacity")]
    pub channel_log_capacity: usize,

    /// Where videos go
    #[serde(default)]
    pub destination: DestinationKind,

    /// Object storage bucket name
    pub storage_bucket_name: Option<String>,
    /// Custom endpoint for S3-compatible providers
    pub storage_endpoint_url: Option<String>,
    /// Object storage region
    #[serde(default = "default_storage_region")]
    pub storage_region: String,
    /// Object storage access key ID (default credential chain when unset)
    pub storage_access_key_id: Option<String>,
    /// Object storage secret access key
    pub storage_secret_access_key: Option<String>,
    /// Key prefix ("folder") for uploaded objects
    pub storage_prefix: Option<String>,
    /// Lifetime of the presigned share link
    #[serde(default = "default_storage_link_ttl_secs")]
    pub storage_link_ttl_secs: u64,

    /// Graph page ID receiving the videos
    pub graph_page_id: Option<String>,
    /// Graph page access token
    pub graph_access_token: Option<String>,
    /// Graph video API base URL
    #[serde(default = "default_graph_api_url")]
    pub graph_api_url: String,
    /// Description attached to every uploaded video
    #[serde(default)]
    pub graph_description: String,
    /// HTTP timeout of a single multipart upload
    #[serde(default = "default_upload_http_timeout_secs")]
    pub upload_http_timeout_secs: u64,

    /// Override of the destination's pause between uploads
    pub upload_delay_secs: Option<u64>,
    /// Poll interval of an idle relay queue
    #[serde(default = "default_idle_poll_secs")]
    pub idle_poll_secs: u64,
    /// Upload attempts per file (1 = no retry)
    #[serde(default = "default_upload_max_attempts")]
    pub upload_max_attempts: usize,
}

const fn default_telegram_http_timeout_secs() -> u64 {
    TELEGRAM_HTTP_TIMEOUT_SECS
}

fn default_base_name() -> String {
    DEFAULT_BASE_NAME.to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STAGING_DIR)
}

const fn default_channel_log_capacity() -> usize {
    CHANNEL_LOG_CAPACITY
}

fn default_storage_region() -> String {
    "auto".to_string()
}

const fn default_storage_link_ttl_secs() -> u64 {
    STORAGE_LINK_TTL_SECS
}

fn default_graph_api_url() -> String {
    DEFAULT_GRAPH_API_URL.to_string()
}

const fn default_upload_http_timeout_secs() -> u64 {
    UPLOAD_HTTP_TIMEOUT_SECS
}

const fn default_idle_poll_secs() -> u64 {
    IDLE_POLL_SECS
}

const fn default_upload_max_attempts() -> usize {
    1
}

/// Build the layered configuration source shared by all settings loaders.
///
/// # Errors
///
/// Returns a `ConfigError` if a present config file cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        // `APP__BASE_NAME=...` sets `base_name`
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Plain UPPER_SNAKE_CASE variables, empty ones treated as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Load settings from files and environment and validate them.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vidrelay::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required value is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = build_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that every value required by the selected mode and destination
    /// is present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` naming all missing values at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();

        if self.telegram_token.trim().is_empty() {
            missing.push("TELEGRAM_TOKEN");
        }
        if self.relay_mode == RelayMode::Batch && self.authorized_user_id.is_none() {
            missing.push("AUTHORIZED_USER_ID");
        }
        if self.source_session == SessionKind::User {
            if self.telegram_api_id.is_none() {
                missing.push("TELEGRAM_API_ID");
            }
            if is_blank(self.telegram_api_hash.as_deref()) {
                missing.push("TELEGRAM_API_HASH");
            }
            if is_blank(self.string_session.as_deref()) {
                missing.push("STRING_SESSION");
            }
        }
        match self.destination {
            DestinationKind::S3 => {
                if is_blank(self.storage_bucket_name.as_deref()) {
                    missing.push("STORAGE_BUCKET_NAME");
                }
                // Explicit keys come in pairs; otherwise the default chain is used
                if is_blank(self.storage_access_key_id.as_deref())
                    != is_blank(self.storage_secret_access_key.as_deref())
                {
                    missing.push("STORAGE_ACCESS_KEY_ID and STORAGE_SECRET_ACCESS_KEY");
                }
            }
            DestinationKind::Graph => {
                if is_blank(self.graph_page_id.as_deref()) {
                    missing.push("GRAPH_PAGE_ID");
                }
                if is_blank(self.graph_access_token.as_deref()) {
                    missing.push("GRAPH_ACCESS_TOKEN");
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Message(format!(
                "missing required configuration: {}",
                missing.join(", ")
            )))
        }
    }

    /// Pause enforced between the starts of two consecutive uploads
    #[must_use]
    pub fn upload_delay(&self) -> Duration {
        self.upload_delay_secs.map_or_else(
            || self.destination.default_upload_delay(),
            Duration::from_secs,
        )
    }

    /// Poll interval of an empty relay queue
    #[must_use]
    pub const fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_poll_secs)
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Default prefix of relayed file names
pub const DEFAULT_BASE_NAME: &str = "My vlog";
/// Default staging directory
pub const DEFAULT_STAGING_DIR: &str = "downloads";
/// Extension used when a downloaded file has none
pub const DEFAULT_VIDEO_EXTENSION: &str = ".mp4";

/// Pause between uploads to object storage
pub const STORAGE_UPLOAD_DELAY_SECS: u64 = 60;
/// Pause between uploads to the rate-limited social endpoint
pub const SOCIAL_UPLOAD_DELAY_SECS: u64 = 300;
/// Poll interval of an empty relay queue
pub const IDLE_POLL_SECS: u64 = 3;

/// Part size of a multipart object storage upload (50 MiB)
pub const STORAGE_CHUNK_SIZE: usize = 50 * 1024 * 1024;
/// Presigned link lifetime (7 days, the S3 maximum)
pub const STORAGE_LINK_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Default Graph video API base URL
pub const DEFAULT_GRAPH_API_URL: &str = "https://graph-video.facebook.com/v19.0";
/// Timeout of one multipart upload
pub const UPLOAD_HTTP_TIMEOUT_SECS: u64 = 1800; // 30 minutes

/// Telegram HTTP client timeout, long enough for big downloads
pub const TELEGRAM_HTTP_TIMEOUT_SECS: u64 = 3600;
/// Telegram API retry settings for status messages
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for Telegram API retry backoff
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

/// Posts remembered for batch history
pub const CHANNEL_LOG_CAPACITY: usize = 1000;
/// Largest count accepted by `/relay`
pub const MAX_BATCH_COUNT: u32 = 300;

/// Initial backoff of upload retries (only when more than one attempt is configured)
pub const UPLOAD_RETRY_INITIAL_BACKOFF_MS: u64 = 2_000;
/// Upper bound of upload retry backoff
pub const UPLOAD_RETRY_MAX_BACKOFF_MS: u64 = 60_000;
