//! Modular common utilities shared across Tokenlink crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors, error classification, PKCE and CSRF primitives
//! - `observability`: tracing instrumentation (not included by default)
//! - `runtime`: async infrastructure (clock, rate limiting, retry, circuit
//!   breaking) and authenticated encryption

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod auth;
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod crypto;
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-exports
// --------------------------------------------------------------------
#[cfg(feature = "foundation")]
pub use auth::{redact_token, CsrfStateGuard, PkceEngine, PkcePair};
#[cfg(feature = "runtime")]
pub use crypto::{EncryptionService, SealedPayload};
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock, MockClock, RateBudget,
    RateLimiter, RateLimiterConfig, RetryDecision, RetryExecutor, RetryOutcome, RetryPolicy,
    SystemClock,
};
