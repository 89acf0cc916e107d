//! Bounded, cancellable polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::VarMergeError;

/// Number of re-polls after the first poll.
pub const DEFAULT_MAX_ATTEMPTS: usize = 15;

/// Wait between polls.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(120);

/// How long to keep polling a remote job.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Re-polls after the first poll.
    pub max_attempts: usize,
    pub delay: Duration,
    /// Overall time budget, measured on the [`Clock`] from the first poll.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// A source of time that can be waited on.
pub trait Clock: Send + Sync {
    /// Time elapsed since this clock was created.
    fn elapsed(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// The wall clock.
#[derive(Clone, Debug)]
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A shared flag that asks running pipelines to stop at their next wait.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Call `poll` until it reports ready.
///
/// `poll` is called once immediately, then up to `policy.max_attempts` more
/// times, sleeping `policy.delay` on `clock` before each. Cancellation and the
/// deadline are checked before every sleep. Returns the number of polls made.
pub fn poll_until_ready<F>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    cancel: &CancelFlag,
    what: &str,
    mut poll: F,
) -> Result<usize, VarMergeError>
where
    F: FnMut() -> Result<bool, VarMergeError>,
{
    let start = clock.elapsed();
    if poll()? {
        return Ok(1);
    }
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(VarMergeError::AnnotationServiceError(format!(
                "{} was cancelled",
                what
            )));
        }
        if let Some(deadline) = policy.deadline {
            if clock.elapsed() - start + policy.delay > deadline {
                return Err(VarMergeError::AnnotationServiceError(format!(
                    "{} not ready within {:?}",
                    what, deadline
                )));
            }
        }
        log::info!(
            "{} not ready, retry {}/{} in {:?}",
            what,
            attempt,
            policy.max_attempts,
            policy.delay
        );
        clock.sleep(policy.delay);
        if poll()? {
            return Ok(attempt + 1);
        }
    }
    Err(VarMergeError::AnnotationServiceError(format!(
        "max retries reached: {} not ready after {} attempts",
        what, policy.max_attempts
    )))
}
