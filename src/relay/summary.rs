use super::RelayAttempt;
use std::fmt;

/// Outcome of a relay run: what went up and what stayed behind
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelaySummary {
    /// Videos the run tried to relay
    pub total: usize,
    /// Names of uploaded files
    pub uploaded: Vec<String>,
    /// Names (or labels) of items that failed to download or upload
    pub failed: Vec<String>,
}

impl RelaySummary {
    /// Empty summary for a run of `total` items
    #[must_use]
    pub const fn new(total: usize) -> Self {
        Self {
            total,
            uploaded: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Account for one upload attempt
    pub fn record(&mut self, attempt: &RelayAttempt) {
        let name = attempt.item.file_name();
        if attempt.succeeded() {
            self.uploaded.push(name);
        } else {
            self.failed.push(name);
        }
    }

    /// Account for an item that never reached the queue
    pub fn record_failure(&mut self, label: impl Into<String>) {
        self.failed.push(label.into());
    }

    /// Number of uploaded files
    #[must_use]
    pub fn uploaded_count(&self) -> usize {
        self.uploaded.len()
    }

    /// True when nothing failed
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for RelaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uploaded: {}/{}", self.uploaded_count(), self.total)?;
        if !self.failed.is_empty() {
            write!(f, "\nFailed ({}):", self.failed.len())?;
            for name in &self.failed {
                write!(f, "\n• {name}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_failures() {
        let mut summary = RelaySummary::new(3);
        summary.uploaded = vec!["My vlog 1.mp4".into(), "My vlog 3.mp4".into()];
        summary.record_failure("My vlog 2.mp4");

        assert_eq!(
            summary.to_string(),
            "Uploaded: 2/3\nFailed (1):\n• My vlog 2.mp4"
        );
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_display_clean_run() {
        let mut summary = RelaySummary::new(1);
        summary.uploaded.push("My vlog 1.mp4".into());
        assert_eq!(summary.to_string(), "Uploaded: 1/1");
        assert!(summary.is_clean());
    }
}
