/*!
End-to-end tests for export runs.

The catalog and bucket store are in-memory fakes that behave like the
provider where it matters: listing is paginated, every status read advances a
scripted task, and only one export task may be active at a time.
*/

use logvault_core::error::ProviderError;
use logvault_core::{
    handle_invocation, ErrorKind, ExportOrchestrator, ExportTaskRequest, ExportTaskStatus,
    FixedClock, InvocationContext, LogCatalog, LogSource, RunConfig, Sleeper, SourcePage,
    StatusCode, TaskId, TerminalState,
};
use logvault_core::{BucketStore, ExportError};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

struct FakeCatalog {
    groups: Vec<LogSource>,
    page_size: usize,
    scripts: HashMap<String, Vec<StatusCode>>,
    state: Mutex<CatalogState>,
}

#[derive(Default)]
struct CatalogState {
    submitted: Vec<ExportTaskRequest>,
    tasks: HashMap<TaskId, VecDeque<StatusCode>>,
    active: Option<TaskId>,
    status_reads: usize,
}

impl FakeCatalog {
    fn new(groups: &[&str]) -> Self {
        Self {
            groups: groups.iter().map(|g| LogSource::new(*g)).collect(),
            page_size: 2,
            scripts: HashMap::new(),
            state: Mutex::new(CatalogState::default()),
        }
    }

    /// Statuses returned for each read of the task exported from `group`.
    /// The last entry repeats once the script runs out.
    fn script(mut self, group: &str, codes: &[StatusCode]) -> Self {
        self.scripts.insert(group.to_string(), codes.to_vec());
        self
    }

    fn submitted(&self) -> Vec<ExportTaskRequest> {
        self.state.lock().unwrap().submitted.clone()
    }

    fn status_reads(&self) -> usize {
        self.state.lock().unwrap().status_reads
    }
}

impl LogCatalog for FakeCatalog {
    fn list_sources(&self, page_token: Option<String>) -> Result<SourcePage, ProviderError> {
        let start: usize = page_token
            .map(|t| t.parse().map_err(|_| ProviderError::new("bad page token")))
            .transpose()?
            .unwrap_or(0);
        let end = (start + self.page_size).min(self.groups.len());

        Ok(SourcePage {
            sources: self.groups[start..end].to_vec(),
            next_token: (end < self.groups.len()).then(|| end.to_string()),
        })
    }

    fn submit_export(&self, request: &ExportTaskRequest) -> Result<TaskId, ProviderError> {
        let mut state = self.state.lock().unwrap();
        if state.active.is_some() {
            return Err(ProviderError::with_code(
                "LimitExceededException",
                "Resource limit exceeded.",
            )
            .with_http_status(400));
        }

        let task_id = TaskId::new(format!("task-{}", state.submitted.len() + 1));
        let script = self
            .scripts
            .get(&request.source)
            .cloned()
            .unwrap_or_else(|| vec![StatusCode::Completed]);

        state.submitted.push(request.clone());
        state.tasks.insert(task_id.clone(), script.into());
        state.active = Some(task_id.clone());
        Ok(task_id)
    }

    fn export_status(&self, task_id: &TaskId) -> Result<ExportTaskStatus, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.status_reads += 1;

        let script = state.tasks.get_mut(task_id).ok_or_else(|| {
            ProviderError::with_code("ResourceNotFoundException", "The specified export task does not exist.")
        })?;
        let code = if script.len() > 1 {
            script.pop_front().unwrap_or(StatusCode::Completed)
        } else {
            script.front().cloned().unwrap_or(StatusCode::Completed)
        };

        if code.is_terminal() && state.active.as_ref() == Some(task_id) {
            state.active = None;
        }

        let mut status = ExportTaskStatus::new(task_id.clone(), code.clone());
        if code == StatusCode::Failed {
            status = status.with_message("Access denied to destination");
        }
        Ok(status)
    }
}

struct FakeBuckets {
    existing: HashSet<String>,
    probes: Mutex<Vec<String>>,
}

impl FakeBuckets {
    fn with(buckets: &[&str]) -> Self {
        Self {
            existing: buckets.iter().map(|b| b.to_string()).collect(),
            probes: Mutex::new(Vec::new()),
        }
    }
}

impl BucketStore for FakeBuckets {
    fn head_bucket(&self, bucket: &str) -> Result<(), ProviderError> {
        self.probes.lock().unwrap().push(bucket.to_string());
        if self.existing.contains(bucket) {
            Ok(())
        } else {
            Err(ProviderError::new("Not Found").with_http_status(404))
        }
    }
}

#[derive(Default)]
struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn recorded(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2019, 6, 3, 14, 30, 15).unwrap())
}

fn config(sources: &[&str]) -> RunConfig {
    RunConfig::new(
        "s3://log-archive",
        sources.iter().map(|s| s.to_string()).collect(),
    )
}

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().map(|s| Duration::from_secs(*s)).collect()
}

#[test]
fn test_full_invocation_exports_each_configured_group() {
    let catalog = FakeCatalog::new(&[
        "/aws/lambda/auth",
        "/aws/lambda/orders",
        "/aws/lambda/payments",
        "/aws/ecs/web",
        "API-Gateway-Execution-Logs",
    ])
    .script(
        "/aws/lambda/orders",
        &[StatusCode::Pending, StatusCode::Running, StatusCode::Completed],
    )
    .script("/aws/ecs/web", &[StatusCode::Failed]);
    let buckets = FakeBuckets::with(&["log-archive"]);
    let sleeper = RecordingSleeper::default();
    let orchestrator = ExportOrchestrator::new(&catalog, &buckets, &sleeper, clock());

    let result = handle_invocation(
        &json!({"source": "aws.events", "detail-type": "Scheduled Event"}),
        &InvocationContext::new("0f1e2d3c"),
        Ok(config(&["/aws/ecs/web", "/aws/lambda/orders", "/aws/lambda/missing", "/aws/lambda/auth"])),
        &orchestrator,
    );

    assert!(result.status);
    // Catalog order, not configuration order; the missing group is skipped
    let sources: Vec<&str> = result
        .export_outcomes
        .iter()
        .map(|o| o.source.as_str())
        .collect();
    assert_eq!(sources, vec!["/aws/lambda/auth", "/aws/lambda/orders", "/aws/ecs/web"]);

    let auth = &result.export_outcomes[0];
    assert!(auth.succeeded);
    assert_eq!(auth.destination_prefix.as_deref(), Some("aws-lambda-auth/2019-3-4"));

    let orders = &result.export_outcomes[1];
    assert!(orders.succeeded);
    assert_eq!(orders.terminal_state, Some(TerminalState::Completed));

    let web = &result.export_outcomes[2];
    assert!(!web.succeeded);
    assert_eq!(web.terminal_state, Some(TerminalState::Failed));
    assert_eq!(web.error_kind, Some(ErrorKind::TaskFailed));
    assert_eq!(
        web.error_message.as_deref(),
        Some("Task:task-3 finished with status FAILED: Access denied to destination")
    );

    // Only the orders task needed to wait
    assert_eq!(sleeper.recorded(), secs(&[6, 12]));
    assert_eq!(catalog.status_reads(), 5);
    assert_eq!(buckets.probes.lock().unwrap().len(), 3);

    let submitted = catalog.submitted();
    assert_eq!(submitted.len(), 3);
    assert!(submitted.iter().all(|r| r.destination_bucket == "log-archive"));
}

#[test]
fn test_timed_out_task_blocks_next_submission() {
    let catalog = FakeCatalog::new(&["/a", "/b"]).script("/a", &[StatusCode::Running]);
    let buckets = FakeBuckets::with(&["log-archive"]);
    let sleeper = RecordingSleeper::default();
    let orchestrator = ExportOrchestrator::new(&catalog, &buckets, &sleeper, clock());

    let report = orchestrator
        .run(
            &config(&["/a", "/b"]).with_poll_timeout_secs(10),
            &[LogSource::new("/a"), LogSource::new("/b")],
        )
        .unwrap();

    let first = &report.outcomes[0];
    assert_eq!(first.terminal_state, Some(TerminalState::TimedOut));
    assert_eq!(first.error_kind, Some(ErrorKind::PollTimeout));
    assert_eq!(sleeper.recorded(), secs(&[6, 12]));

    // The provider still runs the first task, so it refuses the second
    let second = &report.outcomes[1];
    assert!(!second.succeeded);
    assert_eq!(second.error_kind, Some(ErrorKind::SubmissionError));
    assert!(second
        .error_message
        .as_deref()
        .unwrap()
        .contains("LimitExceededException"));
}

#[test]
fn test_long_running_task_with_default_timeout() {
    let catalog = FakeCatalog::new(&["/a"]).script("/a", &[StatusCode::Running]);
    let buckets = FakeBuckets::with(&["log-archive"]);
    let sleeper = RecordingSleeper::default();
    let orchestrator = ExportOrchestrator::new(&catalog, &buckets, &sleeper, clock());

    let report = orchestrator
        .run(&config(&["/a"]), &[LogSource::new("/a")])
        .unwrap();

    assert_eq!(report.outcomes[0].terminal_state, Some(TerminalState::TimedOut));
    assert_eq!(sleeper.recorded(), secs(&[6, 12, 24, 48, 96, 192, 384]));
    assert_eq!(catalog.status_reads(), 8);
}

#[test]
fn test_missing_bucket_rejects_every_source_without_submitting() {
    let catalog = FakeCatalog::new(&["/a", "/b"]);
    let buckets = FakeBuckets::with(&["some-other-bucket"]);
    let sleeper = RecordingSleeper::default();
    let orchestrator = ExportOrchestrator::new(&catalog, &buckets, &sleeper, clock());

    let result = handle_invocation(
        &json!({}),
        &InvocationContext::new("inv"),
        Ok(config(&["/a", "/b"])),
        &orchestrator,
    );

    assert!(result.status);
    assert_eq!(result.failed_sources().count(), 2);
    for outcome in &result.export_outcomes {
        assert_eq!(outcome.error_kind, Some(ErrorKind::DestinationUnavailable));
        assert!(outcome.task_id.is_none());
        assert!(matches!(
            outcome.error,
            Some(ExportError::DestinationUnavailable { .. })
        ));
    }
    assert!(catalog.submitted().is_empty());
    assert!(sleeper.recorded().is_empty());
}

#[test]
fn test_missing_configuration_fails_before_listing() {
    let catalog = FakeCatalog::new(&["/a"]);
    let buckets = FakeBuckets::with(&["log-archive"]);
    let sleeper = RecordingSleeper::default();
    let orchestrator = ExportOrchestrator::new(&catalog, &buckets, &sleeper, clock());

    let config = RunConfig::from_lookup(|key| match key {
        "CW_LOGS_TO_EXPORT" => Some("/a".to_string()),
        _ => None,
    });
    let result = handle_invocation(&json!({}), &InvocationContext::new("inv"), config, &orchestrator);

    assert!(!result.status);
    assert_eq!(result.error_kind, Some(ErrorKind::ConfigError));
    assert!(result.error_message.unwrap().contains("LOG_DEST_BUCKET"));
    assert!(catalog.submitted().is_empty());
}

#[test]
fn test_same_day_rerun_exports_the_window_again() {
    let catalog = FakeCatalog::new(&["/aws/lambda/orders"]);
    let buckets = FakeBuckets::with(&["log-archive"]);
    let sleeper = RecordingSleeper::default();
    let orchestrator = ExportOrchestrator::new(&catalog, &buckets, &sleeper, clock());
    let cfg = config(&["/aws/lambda/orders"]);

    for _ in 0..2 {
        let result = handle_invocation(&json!({}), &InvocationContext::generate(), Ok(cfg.clone()), &orchestrator);
        assert!(result.status);
        assert!(result.export_outcomes[0].succeeded);
    }

    let submitted = catalog.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[0].window, submitted[1].window);
    assert_eq!(submitted[0].destination_prefix, "aws-lambda-orders/2019-3-4");
    assert_eq!(submitted[1].destination_prefix, "aws-lambda-orders/2019-3-4");
    assert_ne!(submitted[0].request_id, submitted[1].request_id);
    assert_ne!(submitted[0].task_name(), submitted[1].task_name());
}
