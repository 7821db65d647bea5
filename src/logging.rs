use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is not set
const DEFAULT_FILTER: &str =
    "vidrelay=info,teloxide=warn,hyper=warn,reqwest=warn,aws_config=warn,aws_smithy_runtime=warn";

/// Filter used when `RUST_LOG` is not set and `DEBUG_MODE` is on
const DEBUG_FILTER: &str = "vidrelay=debug,teloxide=info,info";

/// Regex patterns for redacting sensitive data
pub struct RedactionPatterns {
    token_url: Regex,
    token_bare: Regex,
    token_prefixed: Regex,
    storage_key_id: Regex,
    storage_secret: Regex,
    user_session: Regex,
    access_token: Regex,
    amz_credential: Regex,
    amz_signature: Regex,
}

impl RedactionPatterns {
    /// Compile all patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_url: Regex::new(r"(https?://[^/]+/(?:file/)?bot)([0-9]+:[A-Za-z0-9_-]+)(/)")?,
            token_bare: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token_prefixed: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            storage_key_id: Regex::new(r"STORAGE_ACCESS_KEY_ID=[^\s&]+")?,
            storage_secret: Regex::new(r"STORAGE_SECRET_ACCESS_KEY=[^\s&]+")?,
            user_session: Regex::new(r"((?:STRING_SESSION|TELEGRAM_API_HASH)=)[^\s&]+")?,
            access_token: Regex::new(r"(access_token=)[^\s&]+")?,
            amz_credential: Regex::new(r"(X-Amz-Credential=)[^\s&]+")?,
            amz_signature: Regex::new(r"(X-Amz-Signature=)[^\s&]+")?,
        })
    }

    /// Mask every secret found in `input`
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token_url
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token_bare
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token_prefixed
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .storage_key_id
            .replace_all(&output, "STORAGE_ACCESS_KEY_ID=[MASKED]")
            .to_string();
        output = self
            .storage_secret
            .replace_all(&output, "STORAGE_SECRET_ACCESS_KEY=[MASKED]")
            .to_string();
        output = self
            .user_session
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self
            .access_token
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self
            .amz_credential
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self
            .amz_signature
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // The caller's buffer was consumed in full even if the redacted text is shorter
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

fn default_filter(debug_mode: bool) -> &'static str {
    if debug_mode {
        DEBUG_FILTER
    } else {
        DEFAULT_FILTER
    }
}

fn debug_mode_enabled() -> bool {
    std::env::var("DEBUG_MODE")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Install the global subscriber writing redacted logs to stderr.
///
/// `RUST_LOG` takes precedence; otherwise `DEBUG_MODE` picks the default
/// filter.
///
/// # Errors
///
/// Returns an error if the redaction patterns fail to compile.
pub fn init_logging() -> Result<(), regex::Error> {
    let patterns = Arc::new(RedactionPatterns::new()?);
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug_mode_enabled())));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> RedactionPatterns {
        match RedactionPatterns::new() {
            Ok(p) => p,
            Err(e) => panic!("patterns must compile: {e}"),
        }
    }

    #[test]
    fn test_redacts_telegram_file_url() {
        let line = "GET https://api.telegram.org/file/bot123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw1/videos/file_0.mp4";
        let out = patterns().redact(line);
        assert!(!out.contains("AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw1"));
        assert!(out.contains("/file/bot[TELEGRAM_TOKEN]/videos"));
    }

    #[test]
    fn test_redacts_graph_token_and_presigned_url() {
        let line = "POST /42/videos?access_token=EAAB123&x=1 link=https://r2/v.mp4?X-Amz-Credential=AKIA%2F&X-Amz-Signature=deadbeef";
        let out = patterns().redact(line);
        assert!(out.contains("access_token=[MASKED]&x=1"));
        assert!(out.contains("X-Amz-Credential=[MASKED]"));
        assert!(out.contains("X-Amz-Signature=[MASKED]"));
        assert!(!out.contains("deadbeef"));
    }

    #[test]
    fn test_redacts_storage_env_dump() {
        let out = patterns().redact("STORAGE_SECRET_ACCESS_KEY=s3cr3t STORAGE_ACCESS_KEY_ID=AKIA");
        assert_eq!(
            out,
            "STORAGE_SECRET_ACCESS_KEY=[MASKED] STORAGE_ACCESS_KEY_ID=[MASKED]"
        );
    }

    #[test]
    fn test_redacts_user_session_login() {
        let out = patterns().redact("STRING_SESSION=AQAAAbase64== TELEGRAM_API_HASH=d524b414");
        assert_eq!(out, "STRING_SESSION=[MASKED] TELEGRAM_API_HASH=[MASKED]");
    }

    #[test]
    fn test_writer_reports_full_length() -> io::Result<()> {
        let mut writer = RedactingWriter::new(Vec::new(), Arc::new(patterns()));
        let input = b"token bot123456789:secretsecret";
        assert_eq!(writer.write(input)?, input.len());
        assert_eq!(
            String::from_utf8_lossy(&writer.inner),
            "token bot123456789:[TELEGRAM_TOKEN]"
        );
        Ok(())
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), DEFAULT_FILTER);
        assert_eq!(default_filter(true), DEBUG_FILTER);
    }
}
