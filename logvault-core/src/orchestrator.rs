/*!
Export orchestration across log sources.

The provider allows a single active export task per account, so sources are
handled strictly one after another, in input order: window, destination
check, submission, then polling to a terminal state before the next source
starts. Per-source failures are recorded in that source's outcome and never
stop the run.
*/

use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};

use crate::catalog::LogCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::RunConfig;
use crate::destination::validate_destination;
use crate::poller::{ExportTaskPoller, PollPolicy, Sleeper, ThreadSleeper};
use crate::storage::BucketStore;
use crate::task::{ExportOutcome, ExportTaskRequest, LogSource};
use crate::window::compute_window;
use crate::{ExportError, Result};

/// Outcomes of one run, in the order the sources were given
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub outcomes: Vec<ExportOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.succeeded)
    }
}

/// Sequences window computation, validation, submission and polling
pub struct ExportOrchestrator<C, S, K = ThreadSleeper, T = SystemClock> {
    catalog: C,
    store: S,
    sleeper: K,
    clock: T,
}

impl<C, S> ExportOrchestrator<C, S>
where
    C: LogCatalog,
    S: BucketStore,
{
    /// Orchestrator with a blocking sleeper and the system clock
    pub fn with_defaults(catalog: C, store: S) -> Self {
        Self::new(catalog, store, ThreadSleeper, SystemClock)
    }
}

impl<C, S, K, T> ExportOrchestrator<C, S, K, T>
where
    C: LogCatalog,
    S: BucketStore,
    K: Sleeper,
    T: Clock,
{
    pub fn new(catalog: C, store: S, sleeper: K, clock: T) -> Self {
        Self {
            catalog,
            store,
            sleeper,
            clock,
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Export every source once.
    ///
    /// # Errors
    /// Returns [`ExportError::Config`] for an invalid `config` and
    /// [`ExportError::NoSources`] if `sources` is empty. Nothing is
    /// submitted in either case.
    pub fn run(&self, config: &RunConfig, sources: &[LogSource]) -> Result<RunReport> {
        config.validate()?;
        if sources.is_empty() {
            error!("No log groups to export");
            return Err(ExportError::NoSources {
                requested: config.sources.clone(),
            });
        }

        let policy = PollPolicy::from_config(config);
        info!(
            sources = sources.len(),
            bucket = %config.destination_bucket,
            retention_days = config.retention_days,
            timeout_secs = config.poll_timeout_secs,
            "Starting log export run"
        );

        let outcomes: Vec<ExportOutcome> = sources
            .iter()
            .map(|source| self.export_source(config, source, policy))
            .collect();

        let report = RunReport { outcomes };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Log export run finished"
        );
        Ok(report)
    }

    /// Export a single source and block until its task is terminal
    pub fn export_source(
        &self,
        config: &RunConfig,
        source: &LogSource,
        policy: PollPolicy,
    ) -> ExportOutcome {
        let span = info_span!("export_source", source = %source.name);
        let _enter = span.enter();

        let window = compute_window(config.retention_days, self.clock.now());

        if let Err(e) = validate_destination(&self.store, &config.destination_bucket) {
            record_failure(&e);
            return ExportOutcome::rejected(source.name.clone(), window, e);
        }

        let request = ExportTaskRequest::new(source, window, config.destination_bucket.clone());

        let task_id = match self.catalog.submit_export(&request) {
            Ok(task_id) => task_id,
            Err(provider_error) => {
                let e = ExportError::Submission {
                    source_name: source.name.clone(),
                    error: provider_error,
                };
                warn!(error = %e, "Export task rejected");
                record_failure(&e);
                return ExportOutcome::not_submitted(&request, e);
            }
        };

        #[cfg(feature = "metrics")]
        crate::observability::ExportMetrics::global().record_submission();

        info!(
            task_id = %task_id,
            request_id = %request.request_id,
            prefix = %request.destination_prefix,
            "Export task submitted"
        );

        let poller = ExportTaskPoller::new(&self.catalog, &self.sleeper, policy);
        let report = poller.poll(&task_id);

        #[cfg(feature = "metrics")]
        crate::observability::ExportMetrics::global().record_wait(report.waited());

        let error = report.error();
        if let Some(e) = &error {
            record_failure(e);
        }

        ExportOutcome::submitted(
            &request,
            task_id,
            report.state(),
            report.last_status().cloned(),
            error,
        )
    }
}

fn record_failure(e: &ExportError) {
    warn!(kind = ?e.kind(), error = %e, "Export attempt failed");

    #[cfg(feature = "metrics")]
    crate::observability::ExportMetrics::global().record_failure();
}
