//! Token bucket admission control for outbound calls.
//!
//! The bucket holds a fractional token count that is refilled lazily on
//! every access (`min(capacity, tokens + elapsed * refill_rate)`); there is no
//! background timer. [`RateLimiter::acquire`] suspends until enough tokens are
//! available, [`RateLimiter::try_acquire`] fails fast.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use super::{Clock, SystemClock};
use crate::error::{CommonError, CommonResult};

/// Float slack absorbed when comparing refilled tokens against a request.
const TOKEN_EPSILON: f64 = 1e-9;

/// Shortest suspension between two admission checks.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Configuration for the token bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    /// Maximum number of tokens (burst size)
    pub capacity: u32,
    /// Tokens added per second
    pub refill_rate: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { capacity: 20, refill_rate: 10.0 }
    }
}

impl RateLimiterConfig {
    /// Create a configuration
    #[must_use]
    pub const fn new(capacity: u32, refill_rate: f64) -> Self {
        Self { capacity, refill_rate }
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `CommonError::Validation` when capacity is zero or the refill
    /// rate is not a positive finite number.
    pub fn validate(&self) -> CommonResult<()> {
        if self.capacity == 0 {
            return Err(CommonError::validation("capacity", "must be greater than 0"));
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(CommonError::validation("refill_rate", "must be a positive number"));
        }
        Ok(())
    }
}

/// Snapshot of the bucket state.
///
/// Invariant: `0 <= tokens <= capacity`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBudget {
    /// Maximum number of tokens
    pub capacity: f64,
    /// Tokens added per second
    pub refill_rate: f64,
    /// Tokens currently available
    pub tokens: f64,
    /// Instant of the last refill
    pub last_refill: Instant,
}

impl RateBudget {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Deduct `n` tokens if available, otherwise report how long to wait.
    fn take(&mut self, n: f64) -> Result<(), Duration> {
        if self.tokens + TOKEN_EPSILON >= n {
            self.tokens = (self.tokens - n).max(0.0);
            return Ok(());
        }
        let wait = Duration::from_secs_f64((n - self.tokens) / self.refill_rate);
        Err(wait.max(MIN_WAIT))
    }
}

/// Token bucket rate limiter shared by every outbound call of an
/// installation.
#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    budget: Mutex<RateBudget>,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Create a full bucket using the system clock.
    ///
    /// # Errors
    /// Returns the validation error of `config`.
    pub fn new(config: RateLimiterConfig) -> CommonResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a full bucket driven by `clock`.
    ///
    /// # Errors
    /// Returns the validation error of `config`.
    pub fn with_clock(config: RateLimiterConfig, clock: C) -> CommonResult<Self> {
        config.validate()?;
        let capacity = f64::from(config.capacity);
        let budget = RateBudget {
            capacity,
            refill_rate: config.refill_rate,
            tokens: capacity,
            last_refill: clock.now(),
        };
        Ok(Self { budget: Mutex::new(budget), clock })
    }

    /// Take `n` tokens without waiting.
    ///
    /// Returns `false` when the bucket does not currently hold `n` tokens.
    pub fn try_acquire(&self, n: u32) -> bool {
        let mut budget = self.budget.lock();
        budget.refill(self.clock.now());
        match budget.take(f64::from(n)) {
            Ok(()) => true,
            Err(_) => {
                debug!(requested = n, available = budget.tokens, "Rate limit: insufficient tokens");
                false
            }
        }
    }

    /// Take `n` tokens, suspending the caller until they are available.
    ///
    /// The admission check is repeated after every sleep instead of assuming
    /// the computed wait was exact.
    ///
    /// # Errors
    /// Returns `CommonError::Validation` when `n` exceeds the bucket capacity,
    /// since such a request could never be admitted.
    pub async fn acquire(&self, n: u32) -> CommonResult<()> {
        let requested = f64::from(n);
        loop {
            let wait = {
                let mut budget = self.budget.lock();
                if requested > budget.capacity {
                    return Err(CommonError::validation(
                        "tokens",
                        format!("request for {n} exceeds capacity {}", budget.capacity),
                    ));
                }
                budget.refill(self.clock.now());
                match budget.take(requested) {
                    Ok(()) => return Ok(()),
                    Err(wait) => wait,
                }
            };
            debug!(requested = n, wait_ms = wait.as_millis() as u64, "Rate limit: waiting for tokens");
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available after a lazy refill.
    pub fn available_tokens(&self) -> f64 {
        self.snapshot().tokens
    }

    /// Refill and return a copy of the bucket state.
    pub fn snapshot(&self) -> RateBudget {
        let mut budget = self.budget.lock();
        budget.refill(self.clock.now());
        *budget
    }
}
