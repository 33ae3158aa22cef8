//! Common error types and classification shared by every Tokenlink crate.
//!
//! Two pieces live here:
//!
//! 1. **`CommonError`**: the error patterns that show up in more than one
//!    layer (timeouts, rate limiting, persistence, encryption, ...).
//! 2. **`ErrorClassification`**: the interface the retry executor and the
//!    API gateway use to decide whether a failure is worth another attempt.
//!
//! Module-specific errors compose with `CommonError` instead of duplicating
//! its variants, and implement `ErrorClassification` themselves:
//!
//! ```rust,ignore
//! #[derive(Debug, Error)]
//! pub enum StoreError {
//!     #[error("blob version {0} is not supported")]
//!     UnsupportedVersion(u32),
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//! ```
//!
//! ## Severity levels
//!
//! | Level | Examples |
//! |-------|----------|
//! | **Info** | Missing resources, cancelled work |
//! | **Warning** | Rate limiting, timeouts, open circuits |
//! | **Error** | Configuration, serialization, backend failures |
//! | **Critical** | Integrity failures, entropy exhaustion, invariant violations |

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Error severity used for logging and alerting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Expected condition, nothing to act on
    Info,
    /// Degraded but operational
    Warning,
    /// Failure that needs attention
    Error,
    /// Integrity of the system is at risk
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// Uniform classification of errors for retry and alerting logic.
pub trait ErrorClassification {
    /// Whether repeating the failed operation may succeed.
    fn is_retryable(&self) -> bool;

    /// Severity of the failure.
    fn severity(&self) -> ErrorSeverity;

    /// Whether the failure requires immediate attention.
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Server- or policy-provided delay before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error variants shared across crates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommonError {
    /// Invalid or missing configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A value failed validation
    #[error("Validation error for field '{field}': {message}")]
    Validation { field: String, message: String },

    /// Serialization or deserialization failure
    #[error("Serialization error ({format}): {message}")]
    Serialization { format: String, message: String },

    /// File or storage failure
    #[error("Persistence error during '{operation}': {message}")]
    Persistence { operation: String, message: String },

    /// Operation did not finish within its deadline
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    /// Caller exceeded a local or remote rate limit
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Option<Duration> },

    /// Remote service failure
    #[error("Backend error from '{service}': {message}")]
    Backend { service: String, message: String, is_retryable: bool },

    /// Circuit breaker rejected the call
    #[error("Circuit breaker open for '{service}'")]
    CircuitBreakerOpen { service: String, retry_after: Option<Duration> },

    /// Authenticated encryption failed (bad key, tampered data)
    #[error("Encryption error: {message}")]
    Encryption { message: String },

    /// The operating system could not supply random bytes
    #[error("Entropy source unavailable: {message}")]
    Entropy { message: String },

    /// Internal invariant violated
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::RateLimitExceeded { .. }
            | Self::CircuitBreakerOpen { .. } => true,
            Self::Backend { is_retryable, .. } => *is_retryable,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Timeout { .. }
            | Self::RateLimitExceeded { .. }
            | Self::CircuitBreakerOpen { .. } => ErrorSeverity::Warning,
            Self::Config { .. }
            | Self::Validation { .. }
            | Self::Serialization { .. }
            | Self::Persistence { .. }
            | Self::Backend { .. } => ErrorSeverity::Error,
            Self::Encryption { .. } | Self::Entropy { .. } | Self::Internal { .. } => {
                ErrorSeverity::Critical
            }
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after } | Self::CircuitBreakerOpen { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }
}

impl CommonError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a validation error for a specific field
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Create a serialization error with format information
    pub fn serialization_format<F: Into<String>, M: Into<String>>(format: F, message: M) -> Self {
        Self::Serialization { format: format.into(), message: message.into() }
    }

    /// Create a persistence error for a specific operation
    pub fn persistence_op<O: Into<String>, M: Into<String>>(operation: O, message: M) -> Self {
        Self::Persistence { operation: operation.into(), message: message.into() }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    /// Create a rate limit error
    pub fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self::RateLimitExceeded { retry_after }
    }

    /// Create a backend error
    pub fn backend<S: Into<String>, M: Into<String>>(
        service: S,
        message: M,
        is_retryable: bool,
    ) -> Self {
        Self::Backend { service: service.into(), message: message.into(), is_retryable }
    }

    /// Create a circuit breaker error with retry timing
    pub fn circuit_breaker<S: Into<String>>(service: S, retry_after: Option<Duration>) -> Self {
        Self::CircuitBreakerOpen { service: service.into(), retry_after }
    }

    /// Create an encryption error
    pub fn encryption<S: Into<String>>(message: S) -> Self {
        Self::Encryption { message: message.into() }
    }

    /// Create an entropy error
    pub fn entropy<S: Into<String>>(message: S) -> Self {
        Self::Entropy { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        Self::persistence_op("io", err.to_string())
    }
}
