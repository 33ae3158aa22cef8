//! Consecutive-failure circuit breaker.
//!
//! ```text
//!   Closed ──(failure_threshold consecutive failures)──► Open
//!     ▲                                                   │
//!     │ success                               open_timeout elapsed
//!     │                                                   ▼
//!     └───────────────────────────────────────────── HalfOpen
//!                    failure ──► Open
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use super::{Clock, SystemClock};
use crate::error::{CommonError, CommonResult};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected without reaching the backend
    Open,
    /// A limited number of probe calls are allowed through
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Name used in errors and logs
    pub service: String,
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before probing
    pub open_timeout: Duration,
    /// Probe calls admitted while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            service: "resource-api".to_string(),
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `CommonError::Validation` for zero thresholds or timeout.
    pub fn validate(&self) -> CommonResult<()> {
        if self.failure_threshold == 0 {
            return Err(CommonError::validation("failure_threshold", "must be greater than 0"));
        }
        if self.half_open_max_calls == 0 {
            return Err(CommonError::validation("half_open_max_calls", "must be greater than 0"));
        }
        if self.open_timeout.is_zero() {
            return Err(CommonError::validation("open_timeout", "must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_calls: u32,
}

/// Circuit breaker guarding a flaky dependency.
#[derive(Debug)]
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    clock: C,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker<SystemClock> {
    /// Create a closed breaker using the system clock.
    ///
    /// # Errors
    /// Returns the validation error of `config`.
    pub fn new(config: CircuitBreakerConfig) -> CommonResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a closed breaker driven by `clock`.
    ///
    /// # Errors
    /// Returns the validation error of `config`.
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> CommonResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_calls: 0,
            }),
        })
    }

    /// Admit or reject a call.
    ///
    /// # Errors
    /// Returns `CommonError::CircuitBreakerOpen` with the remaining open time
    /// when the call is rejected.
    pub fn check(&self) -> CommonResult<()> {
        let mut inner = self.inner.lock();
        let now = self.clock.now();

        if inner.state == CircuitState::Open {
            let opened_at = inner.opened_at.unwrap_or(now);
            let elapsed = now.saturating_duration_since(opened_at);
            if elapsed < self.config.open_timeout {
                return Err(CommonError::circuit_breaker(
                    self.config.service.clone(),
                    Some(self.config.open_timeout - elapsed),
                ));
            }
            info!(service = %self.config.service, "Circuit breaker half-open, probing");
            inner.state = CircuitState::HalfOpen;
            inner.half_open_calls = 0;
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.half_open_calls >= self.config.half_open_max_calls {
                return Err(CommonError::circuit_breaker(self.config.service.clone(), None));
            }
            inner.half_open_calls += 1;
        }
        Ok(())
    }

    /// Record a call that reached the backend and did not fail transiently.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!(service = %self.config.service, "Circuit breaker closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.half_open_calls = 0;
    }

    /// Record a transient failure.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let should_open = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if should_open {
            warn!(
                service = %self.config.service,
                failures = inner.consecutive_failures,
                "Circuit breaker opened"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(self.clock.now());
            inner.half_open_calls = 0;
        }
    }

    /// Current state, without triggering the open → half-open transition.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}
