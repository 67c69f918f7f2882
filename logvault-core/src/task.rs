/*!
Export task domain types: sources, requests, provider status and per-source outcomes.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ErrorKind, ExportError};
use crate::window::{destination_prefix, TimeWindow};

/// A log group selected for export
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSource {
    /// Hierarchical group name, e.g. `/aws/lambda/orders`
    pub name: String,
    /// Bytes stored in the group, as reported by the catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_bytes: Option<i64>,
    /// Creation time in epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
}

impl LogSource {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            stored_bytes: None,
            creation_time: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Opaque provider identifier of a submitted export task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One export attempt for one source.
///
/// Every request carries a fresh `request_id`, so two requests for the same
/// source and window are still distinct attempts to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTaskRequest {
    pub request_id: Uuid,
    pub source: String,
    pub window: TimeWindow,
    pub destination_bucket: String,
    pub destination_prefix: String,
}

impl ExportTaskRequest {
    pub fn new<B: Into<String>>(source: &LogSource, window: TimeWindow, bucket: B) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            source: source.name.clone(),
            destination_prefix: destination_prefix(&source.name, &window),
            window,
            destination_bucket: bucket.into(),
        }
    }

    /// Task name sent to the provider
    pub fn task_name(&self) -> String {
        self.request_id.to_string()
    }
}

/// Provider-side export task status code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatusCode {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown(String),
}

impl StatusCode {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Unknown(raw) => raw,
        }
    }

    /// True for codes after which the provider will not change the task
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StatusCode {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<StatusCode> for String {
    fn from(code: StatusCode) -> Self {
        code.as_str().to_string()
    }
}

/// A status snapshot read from the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTaskStatus {
    pub task_id: TaskId,
    pub code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Full task description as returned by the provider
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl ExportTaskStatus {
    pub fn new(task_id: TaskId, code: StatusCode) -> Self {
        Self {
            task_id,
            code,
            message: None,
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }
}

/// How polling for a task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalState {
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    /// Status could not be read
    Errored,
}

/// Result of exporting one source, reported back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
    pub source: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_state: Option<TerminalState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_status: Option<ExportTaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip)]
    pub error: Option<ExportError>,
}

impl ExportOutcome {
    /// Outcome with only the source filled in
    fn for_source<S: Into<String>>(source: S) -> Self {
        Self {
            source: source.into(),
            succeeded: false,
            task_id: None,
            window: None,
            destination_prefix: None,
            terminal_state: None,
            final_status: None,
            error_kind: None,
            error_message: None,
            error: None,
        }
    }

    /// Outcome for a source that failed before a request was built
    pub fn rejected<S: Into<String>>(source: S, window: TimeWindow, error: ExportError) -> Self {
        let mut outcome = Self::for_source(source);
        outcome.window = Some(window);
        outcome.record_error(error);
        outcome
    }

    /// Outcome for a source whose request was built but not accepted
    pub fn not_submitted(request: &ExportTaskRequest, error: ExportError) -> Self {
        let mut outcome = Self::from_request(request);
        outcome.record_error(error);
        outcome
    }

    /// Outcome for a submitted task
    pub fn submitted(
        request: &ExportTaskRequest,
        task_id: TaskId,
        state: TerminalState,
        final_status: Option<ExportTaskStatus>,
        error: Option<ExportError>,
    ) -> Self {
        let mut outcome = Self::from_request(request);
        outcome.task_id = Some(task_id);
        outcome.terminal_state = Some(state);
        outcome.final_status = final_status;
        match error {
            Some(error) => outcome.record_error(error),
            None => outcome.succeeded = state == TerminalState::Completed,
        }
        outcome
    }

    fn from_request(request: &ExportTaskRequest) -> Self {
        let mut outcome = Self::for_source(request.source.clone());
        outcome.window = Some(request.window);
        outcome.destination_prefix = Some(request.destination_prefix.clone());
        outcome
    }

    fn record_error(&mut self, error: ExportError) {
        self.succeeded = false;
        self.error_kind = Some(error.kind());
        self.error_message = Some(error.to_string());
        self.error = Some(error);
    }
}
