//! Resilience patterns for outbound calls
//!
//! - **Clock**: monotonic time source, swappable for `MockClock` in tests
//! - **Rate limiter**: token bucket with lazy refill
//! - **Retry**: exponential backoff with jitter driven by
//!   [`ErrorClassification`](crate::error::ErrorClassification)
//! - **Circuit breaker**: fail fast while a dependency keeps failing

pub mod circuit_breaker;
pub mod clock;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use clock::{Clock, MockClock, SystemClock};
pub use rate_limiter::{RateBudget, RateLimiter, RateLimiterConfig};
pub use retry::{RetryDecision, RetryExecutor, RetryOutcome, RetryPolicy};
