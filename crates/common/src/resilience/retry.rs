//! Exponential backoff with jitter for transient failures.
//!
//! The delay before retry number `k` (zero-based) is
//! `min(initial_delay * multiplier^k, max_delay) * (1 ± jitter_fraction)`.
//! Whether a failure is retried at all is decided by the error's
//! [`ErrorClassification`]: non-retryable errors propagate on the first
//! attempt, and a server-provided `retry_after` replaces the computed delay.
//! A `retry_after` beyond `max_delay` is not slept: the error is returned
//! with its delay intact and a warning names the server delay.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use crate::error::{CommonError, CommonResult, ErrorClassification};

/// Retry policy for one call. Immutable once the call starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any computed delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Relative jitter applied to each delay, in `[0, 1)`
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_fraction: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Set the total number of attempts
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial and maximum delays
    #[must_use]
    pub const fn with_delays(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self
    }

    /// Set the backoff multiplier
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter fraction
    #[must_use]
    pub const fn with_jitter(mut self, jitter_fraction: f64) -> Self {
        self.jitter_fraction = jitter_fraction;
        self
    }

    /// Validate the policy
    ///
    /// # Errors
    /// Returns `CommonError::Validation` for zero attempts, a multiplier
    /// below 1, jitter outside `[0, 1)` or `initial_delay > max_delay`.
    pub fn validate(&self) -> CommonResult<()> {
        if self.max_attempts == 0 {
            return Err(CommonError::validation("max_attempts", "must be at least 1"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(CommonError::validation("multiplier", "must be >= 1.0"));
        }
        if !(0.0..1.0).contains(&self.jitter_fraction) {
            return Err(CommonError::validation("jitter_fraction", "must be in [0, 1)"));
        }
        if self.initial_delay > self.max_delay {
            return Err(CommonError::validation("initial_delay", "must not exceed max_delay"));
        }
        Ok(())
    }

    /// Delay before retry `retry` (zero-based) without jitter.
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay before retry `retry` (zero-based) with jitter applied.
    #[must_use]
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter_fraction <= 0.0 {
            return base;
        }
        let factor = 1.0
            + rand::thread_rng().gen_range(-self.jitter_fraction..=self.jitter_fraction);
        base.mul_f64(factor.max(0.0))
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the computed backoff
    Retry(Duration),
    /// Retry after a server-provided delay
    RetryAfter(Duration),
    /// Propagate the error
    Stop,
}

/// Result of a retried call together with its retry history.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result; the error is the last attempt's error, unchanged
    pub result: Result<T, E>,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Delays slept between attempts
    pub delays: Vec<Duration>,
}

/// Runs fallible async operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create an executor for `policy`.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy applied to every call
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Decide whether the failure of attempt `attempt` (one-based) is retried.
    pub fn decide<E: ErrorClassification>(&self, error: &E, attempt: u32) -> RetryDecision {
        if !error.is_retryable() || attempt >= self.policy.max_attempts {
            return RetryDecision::Stop;
        }
        match error.retry_after() {
            Some(delay) if delay > self.policy.max_delay => RetryDecision::Stop,
            Some(delay) => RetryDecision::RetryAfter(delay),
            None => RetryDecision::Retry(self.policy.jittered_delay(attempt.saturating_sub(1))),
        }
    }

    /// Run `operation` until it succeeds, fails permanently or exhausts the
    /// attempt budget. The final error is returned unchanged.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorClassification + fmt::Display,
    {
        self.run_with_outcome(operation).await.result
    }

    /// Like [`run`](Self::run) but also reports attempts and delays.
    #[instrument(skip_all, fields(max_attempts = self.policy.max_attempts))]
    pub async fn run_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorClassification + fmt::Display,
    {
        let mut attempt: u32 = 0;
        let mut delays = Vec::new();

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return RetryOutcome { result: Ok(value), attempts: attempt, delays };
                }
                Err(error) => error,
            };

            let delay = match self.decide(&error, attempt) {
                RetryDecision::Stop => {
                    match error.retry_after() {
                        Some(server_delay)
                            if error.is_retryable()
                                && attempt < self.policy.max_attempts
                                && server_delay > self.policy.max_delay =>
                        {
                            warn!(
                                attempt,
                                retry_after_ms = server_delay.as_millis() as u64,
                                max_delay_ms = self.policy.max_delay.as_millis() as u64,
                                error = %error,
                                "Server retry delay exceeds max_delay, not retrying"
                            );
                        }
                        _ if error.is_retryable() => {
                            warn!(attempt, error = %error, "Retry budget exhausted");
                        }
                        _ => debug!(attempt, error = %error, "Non-retryable failure"),
                    }
                    return RetryOutcome { result: Err(error), attempts: attempt, delays };
                }
                RetryDecision::Retry(delay) | RetryDecision::RetryAfter(delay) => delay,
            };

            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient failure, retrying"
            );
            delays.push(delay);
            tokio::time::sleep(delay).await;
        }
    }
}
