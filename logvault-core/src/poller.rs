/*!
Export task poller.

Polls a submitted export task until it reaches a terminal state or the wait
budget runs out:

```text
SUBMITTED -> POLLING -> COMPLETED | FAILED | CANCELLED | TIMED_OUT
```

The wait between polls follows [`DoublingBackoff`]: the counter starts at the
seed (3 units) and doubles after every non-terminal poll, and the poller
sleeps for the doubled value. After every poll the counter, not the total
time slept, is compared with the timeout. With a timeout of 10 the counter
runs `3 -> 6 -> 12`, so the poller sleeps twice (6 and 12 units) and declares
`TIMED_OUT` on the third poll whatever the provider reports.
*/

use logvault_retry::DoublingBackoff;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::catalog::LogCatalog;
use crate::config::RunConfig;
use crate::error::{ExportError, ProviderError};
use crate::task::{ExportTaskStatus, StatusCode, TaskId, TerminalState};
use crate::Result;

/// Suspension point between polls
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Sleeper + ?Sized> Sleeper for &T {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Backoff seed, timeout and the length of one time unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub seed: u64,
    pub timeout: u64,
    pub unit: Duration,
}

impl PollPolicy {
    /// Seed of 3 seconds and the given timeout in seconds
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            seed: DoublingBackoff::DEFAULT_SEED,
            timeout: timeout_secs,
            unit: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.poll_timeout_secs)
    }

    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }
}

/// Terminal verdict of one polling session
#[derive(Debug, Clone, PartialEq)]
pub enum PollVerdict {
    Completed(ExportTaskStatus),
    Failed(ExportTaskStatus),
    Cancelled(ExportTaskStatus),
    /// Counter exceeded the timeout; carries the last status read
    TimedOut(ExportTaskStatus),
    /// Reading the status failed
    Errored {
        error: ProviderError,
        last: Option<ExportTaskStatus>,
    },
}

/// Verdict plus what it took to reach it
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub task_id: TaskId,
    pub verdict: PollVerdict,
    pub polls: u32,
    pub sleeps: Vec<Duration>,
}

impl PollReport {
    pub fn state(&self) -> TerminalState {
        match self.verdict {
            PollVerdict::Completed(_) => TerminalState::Completed,
            PollVerdict::Failed(_) => TerminalState::Failed,
            PollVerdict::Cancelled(_) => TerminalState::Cancelled,
            PollVerdict::TimedOut(_) => TerminalState::TimedOut,
            PollVerdict::Errored { .. } => TerminalState::Errored,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.verdict, PollVerdict::Completed(_))
    }

    /// Last status read from the provider, if any
    pub fn last_status(&self) -> Option<&ExportTaskStatus> {
        match &self.verdict {
            PollVerdict::Completed(status)
            | PollVerdict::Failed(status)
            | PollVerdict::Cancelled(status)
            | PollVerdict::TimedOut(status) => Some(status),
            PollVerdict::Errored { last, .. } => last.as_ref(),
        }
    }

    /// Total time spent sleeping between polls
    pub fn waited(&self) -> Duration {
        self.sleeps.iter().sum()
    }

    /// Typed error for every verdict except `Completed`
    pub fn error(&self) -> Option<ExportError> {
        self.clone().into_result().err()
    }

    pub fn into_result(self) -> Result<ExportTaskStatus> {
        let task_id = self.task_id.to_string();
        match self.verdict {
            PollVerdict::Completed(status) => Ok(status),
            PollVerdict::Failed(status) | PollVerdict::Cancelled(status) => {
                Err(ExportError::TaskFailed {
                    task_id,
                    status: status.code.to_string(),
                    message: status.message,
                })
            }
            PollVerdict::TimedOut(status) => Err(ExportError::PollTimeout {
                task_id,
                last_status: status.code.to_string(),
            }),
            PollVerdict::Errored { error, .. } => Err(ExportError::PollTransport { task_id, error }),
        }
    }
}

/// Drives one export task to a terminal state
pub struct ExportTaskPoller<'a, C: ?Sized, S: ?Sized> {
    catalog: &'a C,
    sleeper: &'a S,
    policy: PollPolicy,
}

impl<'a, C, S> ExportTaskPoller<'a, C, S>
where
    C: LogCatalog + ?Sized,
    S: Sleeper + ?Sized,
{
    pub fn new(catalog: &'a C, sleeper: &'a S, policy: PollPolicy) -> Self {
        Self {
            catalog,
            sleeper,
            policy,
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Poll `task_id` until terminal. Each poll re-reads the provider.
    pub fn poll(&self, task_id: &TaskId) -> PollReport {
        let mut backoff = DoublingBackoff::new(self.policy.seed);
        let mut polls = 0u32;
        let mut sleeps = Vec::new();
        let mut last: Option<ExportTaskStatus> = None;

        let verdict = loop {
            polls += 1;

            let status = match self.catalog.export_status(task_id) {
                Ok(status) => status,
                Err(error) => {
                    warn!(task_id = %task_id, poll = polls, error = %error, "Unable to read export task status");
                    break PollVerdict::Errored { error, last };
                }
            };

            #[cfg(feature = "metrics")]
            crate::observability::ExportMetrics::global().record_poll();

            // Checked before the status so a late COMPLETED still times out.
            // A saturated counter can never exceed a timeout of u64::MAX.
            if backoff.exceeds(self.policy.timeout) || backoff.is_saturated() {
                warn!(
                    task_id = %task_id,
                    counter = backoff.current(),
                    timeout = self.policy.timeout,
                    status = %status.code,
                    "Export task wait budget exhausted"
                );
                break PollVerdict::TimedOut(status);
            }

            match status.code {
                StatusCode::Completed => {
                    info!(task_id = %task_id, polls, "Export task completed");
                    break PollVerdict::Completed(status);
                }
                StatusCode::Failed => {
                    warn!(task_id = %task_id, message = ?status.message, "Export task failed");
                    break PollVerdict::Failed(status);
                }
                StatusCode::Cancelled => {
                    warn!(task_id = %task_id, "Export task was cancelled");
                    break PollVerdict::Cancelled(status);
                }
                _ => {
                    let wait = backoff.advance_by(self.policy.unit);
                    debug!(
                        task_id = %task_id,
                        status = %status.code,
                        wait_ms = wait.as_millis() as u64,
                        "Export task still running, backing off"
                    );
                    self.sleeper.sleep(wait);
                    sleeps.push(wait);
                    last = Some(status);
                }
            }
        };

        PollReport {
            task_id: task_id.clone(),
            verdict,
            polls,
            sleeps,
        }
    }
}
