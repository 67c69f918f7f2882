/*!
Error types for the logvault export engine.
*/

use logvault_retry::RetryableError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type used throughout the logvault core.
pub type Result<T> = std::result::Result<T, ExportError>;

/// A failure reported by a provider API (log catalog or object storage).
///
/// Carries the provider's error code when one was returned, so callers can
/// branch on it instead of parsing the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    /// Provider error code, e.g. `NoSuchBucket` or `LimitExceededException`
    pub code: Option<String>,
    /// Human-readable message
    pub message: String,
    /// HTTP status of the failed response, when one was received
    pub http_status: Option<u16>,
}

impl ProviderError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            code: None,
            message: message.into(),
            http_status: None,
        }
    }

    pub fn with_code<C: Into<String>, S: Into<String>>(code: C, message: S) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            http_status: None,
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Error for requests that never got a response (dispatch failure, timeout)
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::with_code(TRANSPORT_CODE, message)
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, self.http_status) {
            (Some(code), Some(status)) => write!(f, "{code} (HTTP {status}): {}", self.message),
            (Some(code), None) => write!(f, "{code}: {}", self.message),
            (None, Some(status)) => write!(f, "HTTP {status}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Code assigned to failures that happened before a response was received
pub const TRANSPORT_CODE: &str = "TransportError";

const TRANSIENT_CODES: &[&str] = &[
    TRANSPORT_CODE,
    "ThrottlingException",
    "Throttling",
    "TooManyRequestsException",
    "ServiceUnavailableException",
    "ServiceUnavailable",
    "InternalError",
    "InternalFailure",
    "RequestTimeout",
    "SlowDown",
];

impl RetryableError for ProviderError {
    fn is_transient(&self) -> bool {
        if let Some(code) = self.code() {
            if TRANSIENT_CODES.contains(&code) {
                return true;
            }
        }
        matches!(self.http_status, Some(status) if status >= 500 || status == 429)
    }
}

/// Why a destination bucket could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationFailure {
    NotFound,
    AccessDenied,
    Transient,
    Other,
}

impl DestinationFailure {
    /// Classify a HEAD bucket failure by code, falling back to HTTP status
    pub fn classify(error: &ProviderError) -> Self {
        match error.code() {
            Some("NoSuchBucket") | Some("NotFound") | Some("404") => return Self::NotFound,
            Some("AccessDenied") | Some("Forbidden") | Some("403") => return Self::AccessDenied,
            _ => {}
        }
        match error.http_status {
            Some(404) => Self::NotFound,
            Some(403) => Self::AccessDenied,
            _ if error.is_transient() => Self::Transient,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for DestinationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not found",
            Self::AccessDenied => "access denied",
            Self::Transient => "transient failure",
            Self::Other => "unavailable",
        };
        f.write_str(label)
    }
}

/// Errors that can occur while archiving log sources.
///
/// `Config`, `NoSources` and `Catalog` abort the whole run. Every other
/// variant is scoped to a single source and ends up in that source's
/// [`ExportOutcome`](crate::task::ExportOutcome).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The filtered source list was empty
    #[error("There are no log groups matching the filter {requested:?}")]
    NoSources { requested: Vec<String> },

    /// Listing the log catalog failed
    #[error("Unable to get list of log groups: {0}")]
    Catalog(ProviderError),

    /// HEAD bucket failed for the destination
    #[error("Destination bucket '{bucket}' {reason}: {error}")]
    DestinationUnavailable {
        bucket: String,
        reason: DestinationFailure,
        error: ProviderError,
    },

    /// The provider rejected the export request
    #[error("Export request for '{source_name}' rejected: {error}")]
    Submission {
        source_name: String,
        error: ProviderError,
    },

    /// The wait budget ran out before the task finished
    #[error("Task:{task_id} is still running. Status:{last_status}")]
    PollTimeout { task_id: String, last_status: String },

    /// Reading the task status failed
    #[error("Unable to verify status of task:{task_id}. ERROR:{error}")]
    PollTransport {
        task_id: String,
        error: ProviderError,
    },

    /// The provider reported the task as failed or cancelled
    #[error("Task:{task_id} finished with status {status}{}", detail_suffix(.message))]
    TaskFailed {
        task_id: String,
        status: String,
        message: Option<String>,
    },
}

fn detail_suffix(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}

/// Discriminant of [`ExportError`], serialized into run results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigError,
    NoSources,
    CatalogError,
    DestinationUnavailable,
    SubmissionError,
    PollTimeout,
    PollTransportError,
    TaskFailed,
}

impl ExportError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::ConfigError,
            Self::NoSources { .. } => ErrorKind::NoSources,
            Self::Catalog(_) => ErrorKind::CatalogError,
            Self::DestinationUnavailable { .. } => ErrorKind::DestinationUnavailable,
            Self::Submission { .. } => ErrorKind::SubmissionError,
            Self::PollTimeout { .. } => ErrorKind::PollTimeout,
            Self::PollTransport { .. } => ErrorKind::PollTransportError,
            Self::TaskFailed { .. } => ErrorKind::TaskFailed,
        }
    }

    /// True for errors that abort the whole run rather than one source
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::NoSources { .. } | Self::Catalog(_)
        )
    }

    /// Provider task id, for errors raised after submission
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::PollTimeout { task_id, .. }
            | Self::PollTransport { task_id, .. }
            | Self::TaskFailed { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}
