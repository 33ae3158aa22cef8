//! Conversions from the typed configuration to component settings

use tokenlink_common::resilience::{RateLimiterConfig, RetryPolicy};
use tokenlink_domain::{LinkConfig, RetrySettings};

/// Retry policy described by `settings`
#[must_use]
pub fn retry_policy(settings: &RetrySettings) -> RetryPolicy {
    RetryPolicy {
        max_attempts: settings.max_attempts,
        initial_delay: settings.initial_delay,
        max_delay: settings.max_delay,
        multiplier: settings.multiplier,
        jitter_fraction: settings.jitter_fraction,
    }
}

/// Token bucket configured by `config`
#[must_use]
pub fn rate_limiter_config(config: &LinkConfig) -> RateLimiterConfig {
    let settings = config.rate_limit();
    RateLimiterConfig::new(settings.capacity, settings.refill_rate)
}
