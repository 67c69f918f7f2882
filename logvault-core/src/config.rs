//! Run configuration for one archival invocation
//!
//! [`RunConfig`] is built once at process start, from the environment or
//! from explicit values, and then passed by reference to every component.
//! Nothing in the crate reads configuration from ambient global state.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ExportError, Result};

/// Days between "now" and the end of the archived window
pub const DEFAULT_RETENTION_DAYS: u32 = 90;
/// Per-task wait budget, in seconds
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 300;
/// Largest accepted retention offset (100 years)
pub const MAX_RETENTION_DAYS: u32 = 36_500;
/// Largest accepted wait budget (one day)
pub const MAX_POLL_TIMEOUT_SECS: u64 = 86_400;

pub const ENV_RETENTION_DAYS: &str = "RETENTION_DAYS";
pub const ENV_DESTINATION_BUCKET: &str = "LOG_DEST_BUCKET";
pub const ENV_POLL_TIMEOUT_SECS: &str = "EXPORT_TIMEOUT_SECS";
pub const ENV_SOURCES: &str = "CW_LOGS_TO_EXPORT";
pub const ENV_REGION: &str = "AWS_REGION";

/// Immutable configuration for a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Retention offset in days; the archived day ends this many days ago
    pub retention_days: u32,
    /// Bucket receiving the exported objects
    pub destination_bucket: String,
    /// Wait budget per export task, compared against the backoff counter
    pub poll_timeout_secs: u64,
    /// Log group names to export, matched exactly and case-sensitively
    pub sources: Vec<String>,
    /// AWS region override (defaults to the SDK's provider chain)
    pub region: Option<String>,
}

impl RunConfig {
    /// Create a configuration with default retention and timeout
    pub fn new<B: Into<String>>(destination_bucket: B, sources: Vec<String>) -> Self {
        RunConfig {
            retention_days: DEFAULT_RETENTION_DAYS,
            destination_bucket: normalize_bucket(&destination_bucket.into()),
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            sources,
            region: None,
        }
    }

    pub fn with_retention_days(mut self, retention_days: u32) -> Self {
        self.retention_days = retention_days;
        self
    }

    pub fn with_poll_timeout_secs(mut self, poll_timeout_secs: u64) -> Self {
        self.poll_timeout_secs = poll_timeout_secs;
        self
    }

    pub fn with_region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Build the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Missing or unparsable retention and timeout values fall back to their
    /// defaults. A missing bucket or an empty source list is a
    /// [`ExportError::Config`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bucket = lookup(ENV_DESTINATION_BUCKET).ok_or_else(|| {
            ExportError::config(format!(
                "{ENV_DESTINATION_BUCKET} must be set to the destination bucket name"
            ))
        })?;

        let sources = lookup(ENV_SOURCES)
            .map(|raw| parse_sources(&raw))
            .unwrap_or_default();

        let config = RunConfig {
            retention_days: parse_retention_days(lookup(ENV_RETENTION_DAYS).as_deref()),
            destination_bucket: normalize_bucket(&bucket),
            poll_timeout_secs: parse_poll_timeout(lookup(ENV_POLL_TIMEOUT_SECS).as_deref()),
            sources,
            region: lookup(ENV_REGION).filter(|r| !r.trim().is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.destination_bucket.is_empty() {
            return Err(ExportError::config(
                "Destination bucket name must not be empty",
            ));
        }
        if self.destination_bucket.contains('/') {
            return Err(ExportError::config(format!(
                "Destination bucket '{}' must be a bare bucket name",
                self.destination_bucket
            )));
        }
        if self.sources.is_empty() {
            return Err(ExportError::config(format!(
                "No log groups configured for export (set {ENV_SOURCES})"
            )));
        }
        if self.retention_days == 0 || self.retention_days > MAX_RETENTION_DAYS {
            return Err(ExportError::config(format!(
                "Retention must be between 1 and {MAX_RETENTION_DAYS} days, got {}",
                self.retention_days
            )));
        }
        if self.poll_timeout_secs == 0 || self.poll_timeout_secs > MAX_POLL_TIMEOUT_SECS {
            return Err(ExportError::config(format!(
                "Poll timeout must be between 1 and {MAX_POLL_TIMEOUT_SECS} seconds, got {}",
                self.poll_timeout_secs
            )));
        }
        Ok(())
    }
}

/// Parse the retention offset, defaulting when absent, invalid, zero or
/// above [`MAX_RETENTION_DAYS`]
pub fn parse_retention_days(raw: Option<&str>) -> u32 {
    match raw.map(str::trim) {
        None | Some("") => DEFAULT_RETENTION_DAYS,
        Some(value) => match value.parse::<u32>() {
            Ok(days) if (1..=MAX_RETENTION_DAYS).contains(&days) => days,
            _ => {
                warn!(
                    value = %value,
                    default = DEFAULT_RETENTION_DAYS,
                    "Invalid retention days, using default"
                );
                DEFAULT_RETENTION_DAYS
            }
        },
    }
}

/// Parse the poll timeout, defaulting when absent, invalid, zero or above
/// [`MAX_POLL_TIMEOUT_SECS`]
pub fn parse_poll_timeout(raw: Option<&str>) -> u64 {
    match raw.map(str::trim) {
        None | Some("") => DEFAULT_POLL_TIMEOUT_SECS,
        Some(value) => match value.parse::<u64>() {
            Ok(secs) if (1..=MAX_POLL_TIMEOUT_SECS).contains(&secs) => secs,
            _ => {
                warn!(
                    value = %value,
                    default = DEFAULT_POLL_TIMEOUT_SECS,
                    "Invalid export timeout, using default"
                );
                DEFAULT_POLL_TIMEOUT_SECS
            }
        },
    }
}

/// Split a comma separated list of log group names.
///
/// Names are kept as-is apart from surrounding whitespace; empty entries and
/// repeats are dropped while preserving first-seen order.
pub fn parse_sources(raw: &str) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !sources.iter().any(|s| s == name) {
            sources.push(name.to_string());
        }
    }
    sources
}

/// Accept either a bare bucket name or an `s3://bucket[/]` URI
fn normalize_bucket(raw: &str) -> String {
    let trimmed = raw.trim();
    let name = trimmed.strip_prefix("s3://").unwrap_or(trimmed);
    name.trim_end_matches('/').to_string()
}
