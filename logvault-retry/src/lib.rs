//! Backoff schedules and transient-error retry for logvault provider calls
//!
//! Two policies live here. [`DoublingBackoff`] is the deterministic
//! seed-doubling counter that paces export task polling. [`retry_transient`]
//! wraps the `backoff` crate for idempotent read calls (catalog listing) that
//! may hit throttling or dispatch failures.

use backoff::ExponentialBackoffBuilder;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub use backoff::ExponentialBackoff;

/// Errors surfaced once a retried operation gives up
#[derive(Error, Debug)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    #[error("Operation '{operation}' exhausted its retry budget after {attempts} attempts: {source}")]
    Exhausted {
        operation: &'static str,
        attempts: usize,
        source: E,
    },
    #[error("Permanent error in '{operation}' on attempt {attempts}: {source}")]
    Permanent {
        operation: &'static str,
        attempts: usize,
        source: E,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Unwrap the last error returned by the operation
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Permanent { source, .. } => source,
        }
    }

    /// Number of attempts made before giving up
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Permanent { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = std::result::Result<T, RetryError<E>>;

/// Trait for categorizing errors as transient or permanent
pub trait RetryableError {
    /// Returns true if the error is transient and the operation should be retried
    fn is_transient(&self) -> bool;

    /// Returns true if the error is permanent and retries should stop
    fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Seed-doubling counter used to pace status polling.
///
/// The counter starts at `seed` and doubles on every [`advance`](Self::advance).
/// There is no cap on the interval; callers bound the total wait by comparing
/// [`current`](Self::current) against their own limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoublingBackoff {
    seed: u64,
    current: u64,
}

impl DoublingBackoff {
    /// Seed used for export task polling
    pub const DEFAULT_SEED: u64 = 3;

    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            current: seed,
        }
    }

    /// Current counter value, in caller-defined time units
    pub fn current(&self) -> u64 {
        self.current
    }

    /// True once the counter is strictly greater than `limit`
    pub fn exceeds(&self, limit: u64) -> bool {
        self.current > limit
    }

    /// True once doubling can no longer grow the counter
    pub fn is_saturated(&self) -> bool {
        self.current == u64::MAX
    }

    /// Double the counter and return the new value as the next wait
    pub fn advance(&mut self) -> u64 {
        self.current = self.current.saturating_mul(2);
        self.current
    }

    /// Like [`advance`](Self::advance) but scaled by `unit`
    pub fn advance_by(&mut self, unit: Duration) -> Duration {
        let steps = u32::try_from(self.advance()).unwrap_or(u32::MAX);
        unit.saturating_mul(steps)
    }

    pub fn reset(&mut self) {
        self.current = self.seed;
    }
}

impl Default for DoublingBackoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEED)
    }
}

/// Execute a blocking operation, retrying transient failures with `policy`.
///
/// The closure receives the 1-based attempt number. Errors classified as
/// permanent stop immediately; transient errors are retried until the
/// policy's elapsed-time budget runs out.
pub fn retry_transient<T, E, F>(
    op_name: &'static str,
    policy: ExponentialBackoff,
    mut f: F,
) -> RetryResult<T, E>
where
    E: RetryableError + std::error::Error + 'static,
    F: FnMut(usize) -> std::result::Result<T, E>,
{
    let mut attempt = 0usize;

    let operation = || {
        attempt += 1;
        debug!("Attempting operation '{}' (attempt {})", op_name, attempt);
        f(attempt).map_err(|err| {
            if err.is_transient() {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            }
        })
    };

    let notify = |err: E, wait: Duration| {
        warn!(
            operation = op_name,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "Transient failure, backing off"
        );
    };

    let result = backoff::retry_notify(policy, operation, notify);

    match result {
        Ok(value) => {
            if attempt > 1 {
                debug!(
                    "Operation '{}' succeeded after {} attempts",
                    op_name, attempt
                );
            }
            Ok(value)
        }
        Err(backoff::Error::Permanent(source)) => {
            warn!(
                "Operation '{}' failed permanently on attempt {}",
                op_name, attempt
            );
            Err(RetryError::Permanent {
                operation: op_name,
                attempts: attempt,
                source,
            })
        }
        Err(backoff::Error::Transient { err: source, .. }) => {
            warn!(
                "Operation '{}' gave up after {} attempts",
                op_name, attempt
            );
            Err(RetryError::Exhausted {
                operation: op_name,
                attempts: attempt,
                source,
            })
        }
    }
}

/// Backoff policy for catalog listing calls
pub fn catalog_listing_backoff_policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_max_interval(Duration::from_secs(10))
        .with_max_elapsed_time(Some(Duration::from_secs(60)))
        .with_multiplier(1.5)
        .build()
}

/// Short policy for tests and local endpoints
pub fn fast_backoff_policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(1))
        .with_max_interval(Duration::from_millis(5))
        .with_max_elapsed_time(Some(Duration::from_millis(200)))
        .with_multiplier(2.0)
        .build()
}
