/*!
 * Retry Policy
 * Linear, capped backoff shared by the reporter and the resilient store
 *
 * Delays start at `initial_delay`, grow by `step` per retry and never exceed
 * `max_delay`. Errors classified as terminal return immediately without
 * sleeping and without counting against `max_retries`.
 */

use crate::core::limits::{INITIAL_RETRY_DELAY, MAX_RETRIES, MAX_RETRY_DELAY, RETRY_DELAY_STEP};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Linear capped backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Increment added after every retry
    pub step: Duration,
    /// Delay ceiling
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: INITIAL_RETRY_DELAY,
            step: RETRY_DELAY_STEP,
            max_delay: MAX_RETRY_DELAY,
        }
    }
}

/// Final outcome of a failed [`RetryPolicy::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    /// Last error returned by the operation
    pub error: E,
    /// Number of times the operation was invoked
    pub attempts: u32,
    /// True when the error was terminal rather than exhausting the retries
    pub terminal: bool,
}

impl RetryPolicy {
    /// Policy that never retries
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            step: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Same shape as the default, scaled to a different time unit
    pub fn with_unit(unit: Duration) -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: unit,
            step: unit * 2,
            max_delay: unit * 5,
        }
    }

    /// Delay slept before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let grown = self
            .initial_delay
            .saturating_add(self.step.saturating_mul(retry.saturating_sub(1)));
        grown.min(self.max_delay)
    }

    /// Full delay schedule for a permanently failing operation
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_retries).map(move |retry| self.delay_for(retry))
    }

    /// Invoke `op` until it succeeds, fails terminally or exhausts retries
    ///
    /// `is_terminal` selects the non-retryable errors; those are returned
    /// after a single invocation.
    pub async fn retry<T, E, F, Fut, P>(&self, op: F, is_terminal: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        self.run(op, is_terminal).await.map_err(|failure| failure.error)
    }

    /// Like [`retry`](Self::retry) but reports the attempt count on failure
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_terminal: P) -> Result<T, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut retries = 0u32;

        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            let attempts = retries + 1;

            if is_terminal(&error) {
                return Err(RetryFailure {
                    error,
                    attempts,
                    terminal: true,
                });
            }

            retries += 1;
            if retries > self.max_retries {
                error!(error = %error, attempts, "maximum number of retries reached");
                return Err(RetryFailure {
                    error,
                    attempts,
                    terminal: false,
                });
            }

            let delay = self.delay_for(retries);
            warn!(error = %error, retry = retries, delay_ms = delay.as_millis() as u64, "backoff retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
