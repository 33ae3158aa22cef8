//! Integration tests for the resilience module
//!
//! Combines the rate limiter, retry executor and circuit breaker the way the
//! API gateway stacks them.

#![cfg(feature = "runtime")]

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokenlink_common::error::{CommonError, ErrorClassification};
use tokenlink_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, MockClock, RateLimiter, RateLimiterConfig,
    RetryExecutor, RetryPolicy,
};

/// Validates concurrent acquisitions never overdraw the bucket.
///
/// # Test Steps
/// 1. Share a bucket of 20 tokens refilling at 10/s across 30 tasks
/// 2. Every task acquires one token
/// 3. Confirm the last admission happened about one second after the start
#[tokio::test(start_paused = true)]
async fn test_concurrent_acquire_respects_refill_rate() {
    let bucket = Arc::new(RateLimiter::new(RateLimiterConfig::default()).expect("valid config"));
    let start = tokio::time::Instant::now();

    let mut handles = Vec::new();
    for _ in 0..30 {
        let bucket = Arc::clone(&bucket);
        handles.push(tokio::spawn(async move {
            bucket.acquire(1).await.expect("within capacity");
            tokio::time::Instant::now()
        }));
    }

    let mut last = start;
    for handle in handles {
        last = last.max(handle.await.expect("task completes"));
    }

    let elapsed = last - start;
    assert!(elapsed >= Duration::from_millis(1_000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1_200), "elapsed {elapsed:?}");
    assert!(bucket.available_tokens() < 1.0);
}

/// Validates an open circuit short-circuits retries with its retry hint.
///
/// # Test Steps
/// 1. Open a breaker with two failures
/// 2. Run a retried call guarded by the breaker
/// 3. Confirm the executor waits for the breaker's remaining open time
#[tokio::test(start_paused = true)]
async fn test_retry_waits_out_open_circuit() {
    let clock = MockClock::new();
    let breaker = CircuitBreaker::with_clock(
        CircuitBreakerConfig {
            failure_threshold: 2,
            open_timeout: Duration::from_secs(5),
            ..CircuitBreakerConfig::default()
        },
        clock.clone(),
    )
    .expect("valid config");
    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    let executor = RetryExecutor::new(RetryPolicy::default());
    let outcome = executor
        .run_with_outcome(|| {
            let admitted = breaker.check();
            if admitted.is_err() {
                clock.advance(Duration::from_secs(5));
            }
            async move { admitted.map(|()| "probe") }
        })
        .await;

    assert_eq!(outcome.result, Ok("probe"));
    assert_eq!(outcome.delays, vec![Duration::from_secs(5)]);
}

#[derive(Debug)]
struct Flaky(u32);

impl fmt::Display for Flaky {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flaky #{}", self.0)
    }
}

impl ErrorClassification for Flaky {
    fn is_retryable(&self) -> bool {
        true
    }

    fn severity(&self) -> tokenlink_common::ErrorSeverity {
        tokenlink_common::ErrorSeverity::Warning
    }
}

#[tokio::test(start_paused = true)]
async fn test_attempt_budget_bounds_calls() {
    let policy = RetryPolicy::default().with_max_attempts(5).with_jitter(0.0);
    let executor = RetryExecutor::new(policy);
    let calls = AtomicU32::new(0);
    let start = tokio::time::Instant::now();

    let result: Result<(), Flaky> = executor
        .run(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(Flaky(n)) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert!(matches!(result, Err(Flaky(4))));
    assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 4 + 8));
}

#[test]
fn test_common_errors_drive_retry_decisions() {
    let executor = RetryExecutor::new(RetryPolicy::default());
    let throttled = CommonError::rate_limit(Some(Duration::from_secs(2)));
    let invalid = CommonError::validation("tokens", "too many");

    assert!(matches!(
        executor.decide(&throttled, 1),
        tokenlink_common::RetryDecision::RetryAfter(d) if d == Duration::from_secs(2)
    ));
    assert_eq!(executor.decide(&invalid, 1), tokenlink_common::RetryDecision::Stop);
}
