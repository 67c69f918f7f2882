/*!
Invocation entry point.

A scheduled trigger hands over an opaque JSON payload and an execution
context. The handler validates the run configuration, discovers the
configured log groups, runs the orchestrator and folds everything into an
[`InvocationResult`].
*/

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

use crate::catalog::{discover_sources, LogCatalog};
use crate::clock::Clock;
use crate::config::RunConfig;
use crate::error::ErrorKind;
use crate::orchestrator::{ExportOrchestrator, RunReport};
use crate::poller::Sleeper;
use crate::storage::BucketStore;
use crate::task::ExportOutcome;
use crate::{ExportError, Result};

/// Execution context supplied by the trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    pub invocation_id: String,
}

impl InvocationContext {
    pub fn new<S: Into<String>>(invocation_id: S) -> Self {
        Self {
            invocation_id: invocation_id.into(),
        }
    }

    /// Context with a random invocation id, for manual runs
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

/// What the invocation reports back to its caller.
///
/// `status` is false only when the run itself failed (bad configuration,
/// catalog listing failure, nothing to export). Per-source failures are in
/// `export_outcomes` and leave `status` true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub export_outcomes: Vec<ExportOutcome>,
}

impl InvocationResult {
    pub fn completed(report: RunReport) -> Self {
        Self {
            status: true,
            error_message: None,
            error_kind: None,
            export_outcomes: report.outcomes,
        }
    }

    pub fn failed(error: &ExportError) -> Self {
        Self {
            status: false,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind()),
            export_outcomes: Vec::new(),
        }
    }

    /// Sources whose export did not complete
    pub fn failed_sources(&self) -> impl Iterator<Item = &ExportOutcome> {
        self.export_outcomes.iter().filter(|o| !o.succeeded)
    }
}

/// Run one scheduled invocation
pub fn handle_invocation<C, S, K, T>(
    payload: &serde_json::Value,
    context: &InvocationContext,
    config: Result<RunConfig>,
    orchestrator: &ExportOrchestrator<C, S, K, T>,
) -> InvocationResult
where
    C: LogCatalog,
    S: BucketStore,
    K: Sleeper,
    T: Clock,
{
    let span = info_span!("invocation", invocation_id = %context.invocation_id);
    let _enter = span.enter();
    debug!(payload = %payload, "Received trigger payload");

    match execute(config, orchestrator) {
        Ok(report) => {
            info!(
                succeeded = report.succeeded(),
                failed = report.failed(),
                "Invocation finished"
            );
            InvocationResult::completed(report)
        }
        Err(e) => {
            error!(kind = ?e.kind(), error = %e, "Invocation failed");
            InvocationResult::failed(&e)
        }
    }
}

fn execute<C, S, K, T>(
    config: Result<RunConfig>,
    orchestrator: &ExportOrchestrator<C, S, K, T>,
) -> Result<RunReport>
where
    C: LogCatalog,
    S: BucketStore,
    K: Sleeper,
    T: Clock,
{
    let config = config?;
    config.validate()?;

    let sources = discover_sources(orchestrator.catalog(), &config.sources)?;
    orchestrator.run(&config, &sources)
}
