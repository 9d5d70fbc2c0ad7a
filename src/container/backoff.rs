//! Bounded exponential retry.
//!
//! [`retry`] drives every retry loop in the crate: the reuse repair loop and the
//! readiness probe. Operations report [`RetryError::Permanent`] to stop immediately and
//! [`RetryError::Transient`] to be retried after the next backoff interval.

use crate::container::{ContainerError, Result};
use crate::env::defaults;
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Exponential backoff schedule.
///
/// Each interval is the previous one times `multiplier`, capped at `max_interval`, and
/// randomized by `randomization_factor`. The schedule stops once waiting for the next
/// interval would pass `max_elapsed_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    /// First interval
    pub initial_interval: Duration,
    /// Upper bound for a single interval
    pub max_interval: Duration,
    /// Growth factor between intervals
    pub multiplier: f64,
    /// Jitter as a fraction of the interval, `0.0` disables it
    pub randomization_factor: f64,
    /// Total time budget; `None` retries until success or cancellation
    pub max_elapsed_time: Option<Duration>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::probe_default()
    }
}

impl ExponentialBackoff {
    /// Create a schedule with the default multiplier and jitter.
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
    ) -> Self {
        Self {
            initial_interval,
            max_interval,
            multiplier: defaults::BACKOFF_MULTIPLIER,
            randomization_factor: defaults::BACKOFF_RANDOMIZATION,
            max_elapsed_time,
        }
    }

    /// Schedule used while waiting for an existing container to become reusable.
    pub fn reuse_default() -> Self {
        Self::new(
            defaults::REUSE_INITIAL_INTERVAL,
            defaults::REUSE_MAX_INTERVAL,
            Some(defaults::REUSE_TIMEOUT),
        )
    }

    /// Schedule used for readiness probes.
    pub fn probe_default() -> Self {
        Self::new(
            defaults::PROBE_INITIAL_INTERVAL,
            defaults::PROBE_MAX_INTERVAL,
            Some(defaults::PROBE_TIMEOUT),
        )
    }

    /// Replace the total time budget.
    pub fn with_max_elapsed_time(mut self, max_elapsed_time: Option<Duration>) -> Self {
        self.max_elapsed_time = max_elapsed_time;
        self
    }

    /// Disable jitter, mostly useful in tests.
    pub fn without_jitter(mut self) -> Self {
        self.randomization_factor = 0.0;
        self
    }

    fn start(&self) -> Schedule<'_> {
        Schedule {
            config: self,
            current: self.initial_interval,
            started: Instant::now(),
        }
    }
}

struct Schedule<'a> {
    config: &'a ExponentialBackoff,
    current: Duration,
    started: Instant,
}

impl Schedule<'_> {
    /// Next wait, or `None` when the time budget does not allow another attempt.
    fn next_backoff(&mut self) -> Option<Duration> {
        let next = randomize(self.current, self.config.randomization_factor);

        self.current = self
            .current
            .mul_f64(self.config.multiplier.max(1.0))
            .min(self.config.max_interval);

        match self.config.max_elapsed_time {
            Some(budget) if self.started.elapsed() + next > budget => None,
            _ => Some(next),
        }
    }
}

fn randomize(interval: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || interval.is_zero() {
        return interval;
    }

    let secs = interval.as_secs_f64();
    let delta = secs * factor.min(1.0);
    let randomized = rand::rng().random_range((secs - delta)..=(secs + delta));
    Duration::from_secs_f64(randomized.max(0.0))
}

/// Failure of a single attempt.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// Retrying cannot help, stop now
    #[error(transparent)]
    Permanent(ContainerError),
    /// Worth another attempt after backoff
    #[error(transparent)]
    Transient(ContainerError),
}

impl RetryError {
    /// Mark an error as permanent.
    pub fn permanent<E: Into<ContainerError>>(err: E) -> Self {
        RetryError::Permanent(err.into())
    }

    /// Mark an error as transient.
    pub fn transient<E: Into<ContainerError>>(err: E) -> Self {
        RetryError::Transient(err.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, RetryError::Permanent(_))
    }

    pub fn into_inner(self) -> ContainerError {
        match self {
            RetryError::Permanent(err) | RetryError::Transient(err) => err,
        }
    }
}

impl From<ContainerError> for RetryError {
    fn from(err: ContainerError) -> Self {
        RetryError::Transient(err)
    }
}

impl From<bollard::errors::Error> for RetryError {
    fn from(err: bollard::errors::Error) -> Self {
        RetryError::Transient(err.into())
    }
}

/// Run `operation` until it succeeds, fails permanently, the schedule runs out or
/// `cancel` fires.
///
/// The operation always runs at least once, even with an exhausted budget.
///
/// # Errors
///
/// - the permanent error itself, unwrapped
/// - [`ContainerError::RetryTimeout`] with the last error and, when it differs, the one
///   before it
/// - [`ContainerError::Cancelled`] when `cancel` fires during an attempt or a wait
pub async fn retry<T, F, Fut>(
    backoff: &ExponentialBackoff,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RetryError>>,
{
    let mut schedule = backoff.start();
    let mut attempts: u32 = 0;
    let mut previous: Option<ContainerError> = None;

    loop {
        attempts += 1;

        let outcome = tokio::select! {
            biased;
            outcome = operation() => outcome,
            _ = cancel.cancelled() => {
                return Err(ContainerError::Cancelled {
                    last: previous.map(Box::new),
                });
            }
        };

        let err = match outcome {
            Ok(value) => {
                if attempts > 1 {
                    debug!("Operation succeeded after {} attempts", attempts);
                }
                return Ok(value);
            }
            Err(RetryError::Permanent(err)) => {
                debug!("Attempt {} failed permanently: {}", attempts, err);
                return Err(err);
            }
            Err(RetryError::Transient(err)) => err,
        };

        let Some(wait) = schedule.next_backoff() else {
            return Err(timeout_error(attempts, err, previous));
        };

        debug!(
            "Attempt {} failed: {}; retrying in {:?}",
            attempts, err, wait
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ContainerError::Cancelled {
                    last: Some(Box::new(err)),
                });
            }
            _ = tokio::time::sleep(wait) => {}
        }

        previous = Some(err);
    }
}

fn timeout_error(
    attempts: u32,
    last: ContainerError,
    previous: Option<ContainerError>,
) -> ContainerError {
    let previous = previous
        .filter(|prev| prev.to_string() != last.to_string())
        .map(Box::new);

    ContainerError::RetryTimeout {
        attempts,
        last: Box::new(last),
        previous,
    }
}
