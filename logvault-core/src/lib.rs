/*!
# logvault core

Scheduled archiving of managed log groups to object storage.

Each run takes the configured log groups, computes a one-day window that ends
`retention_days` ago, checks that the destination bucket is reachable and
submits one export task per group. The provider only runs one export task per
account at a time, so groups are exported one after another and every task is
polled to a terminal state before the next one is submitted.

## Architecture

The engine only talks to the provider through two ports:
- [`LogCatalog`]: lists log groups, submits export tasks, reads task status
- [`BucketStore`]: probes the destination bucket

The `aws` feature provides CloudWatch Logs and S3 implementations. Everything
else is synchronous and can be driven with in-memory fakes.

## Usage

```rust,no_run
use logvault_core::{
    discover_sources, AwsEnvironment, CloudWatchLogsCatalog, ExportOrchestrator, RunConfig,
    S3BucketStore,
};

let config = RunConfig::from_env()?;
let env = AwsEnvironment::load(config.region.as_deref())?;
let orchestrator = ExportOrchestrator::with_defaults(
    CloudWatchLogsCatalog::new(&env),
    S3BucketStore::new(&env),
);

let sources = discover_sources(orchestrator.catalog(), &config.sources)?;
let report = orchestrator.run(&config, &sources)?;
for outcome in &report.outcomes {
    println!("{}: {}", outcome.source, outcome.succeeded);
}
# Ok::<(), logvault_core::ExportError>(())
```
*/

#[cfg(feature = "aws")]
pub mod aws;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod destination;
pub mod error;
pub mod handler;
pub mod observability;
pub mod orchestrator;
pub mod poller;
pub mod storage;
pub mod task;
pub mod window;

#[cfg(feature = "aws")]
pub use aws::AwsEnvironment;
#[cfg(feature = "aws")]
pub use catalog::cloudwatch::CloudWatchLogsCatalog;
pub use catalog::{discover_sources, LogCatalog, SourcePage};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::RunConfig;
pub use destination::validate_destination;
pub use error::{DestinationFailure, ErrorKind, ExportError, ProviderError, Result};
pub use handler::{handle_invocation, InvocationContext, InvocationResult};
pub use orchestrator::{ExportOrchestrator, RunReport};
pub use poller::{ExportTaskPoller, PollPolicy, PollReport, PollVerdict, Sleeper, ThreadSleeper};
#[cfg(feature = "aws")]
pub use storage::S3BucketStore;
pub use storage::BucketStore;
pub use task::{
    ExportOutcome, ExportTaskRequest, ExportTaskStatus, LogSource, StatusCode, TaskId,
    TerminalState,
};
pub use window::{compute_window, destination_prefix, TimeWindow};
