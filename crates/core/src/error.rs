//! Error taxonomy for authorization, refresh and gateway calls
//!
//! Classification drives [`RetryExecutor`](tokenlink_common::RetryExecutor):
//! only `RateLimited`, `TransientNetwork` and storage timeouts are retried.
//! Messages never carry token or key material.

use std::time::Duration;

use thiserror::Error;
use tokenlink_common::error::{CommonError, ErrorClassification, ErrorSeverity};
use tokenlink_domain::{DomainError, ReauthReason};
use uuid::Uuid;

pub type OAuthResult<T> = std::result::Result<T, OAuthError>;

/// Failures surfaced by the core services
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OAuthError {
    /// State mismatch, bad callback, server `error` response, malformed payload
    #[error("Protocol error: {message}")]
    Protocol { message: String, code: Option<String> },

    /// The grant or credential was rejected
    #[error("Authentication failed ({reason}): {message}")]
    Authentication { reason: ReauthReason, message: String },

    #[error("Rate limited by '{service}'")]
    RateLimited { service: String, retry_after: Option<Duration> },

    /// Timeout, connection failure or 5xx
    #[error("Transient network error: {message}")]
    TransientNetwork { message: String, retry_after: Option<Duration> },

    /// Stored blob failed integrity or format checks
    #[error("Token store is corrupt: {0}")]
    CorruptStore(String),

    /// Entropy source or cipher unavailable
    #[error("Cryptographic failure: {0}")]
    CryptoFailure(String),

    #[error("Authorization flow {0} not found")]
    FlowNotFound(Uuid),

    #[error("Authorization flow {0} expired")]
    FlowExpired(Uuid),

    /// Terminal until a new authorization flow installs tokens
    #[error("Reauthorization required: {0}")]
    ReauthRequired(ReauthReason),

    /// No token set has been installed yet
    #[error("Not authorized")]
    NotAuthorized,

    /// Non-retryable resource API response
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String, retryable: bool },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OAuthError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into(), code: None }
    }

    /// Protocol error carrying the OAuth `error` code
    pub fn protocol_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into(), code: Some(code.into()) }
    }

    pub fn authentication(reason: ReauthReason, message: impl Into<String>) -> Self {
        Self::Authentication { reason, message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientNetwork { message: message.into(), retry_after: None }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into(), retryable: false }
    }

    pub fn storage_timeout(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into(), retryable: true }
    }

    /// Reason to enter `ReauthRequired`, when this error implies the grant is
    /// unusable.
    #[must_use]
    pub const fn reauth_reason(&self) -> Option<ReauthReason> {
        match self {
            Self::Authentication { reason, .. } => Some(*reason),
            Self::ReauthRequired(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl ErrorClassification for OAuthError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::TransientNetwork { .. } => true,
            Self::Storage { retryable, .. } => *retryable,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CorruptStore(_) | Self::CryptoFailure(_) => ErrorSeverity::Critical,
            Self::RateLimited { .. } | Self::TransientNetwork { .. } => ErrorSeverity::Warning,
            Self::FlowNotFound(_) | Self::FlowExpired(_) | Self::NotAuthorized => {
                ErrorSeverity::Info
            }
            _ => ErrorSeverity::Error,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } | Self::TransientNetwork { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }
}

impl From<CommonError> for OAuthError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Entropy { message } => Self::CryptoFailure(message),
            CommonError::Encryption { message } => Self::CryptoFailure(message),
            CommonError::Timeout { operation, duration } => Self::TransientNetwork {
                message: format!("'{operation}' timed out after {duration:?}"),
                retry_after: None,
            },
            CommonError::RateLimitExceeded { retry_after } => {
                Self::RateLimited { service: "local".to_string(), retry_after }
            }
            CommonError::CircuitBreakerOpen { service, retry_after } => Self::TransientNetwork {
                message: format!("circuit open for '{service}'"),
                retry_after,
            },
            CommonError::Backend { service, message, is_retryable: true } => {
                Self::TransientNetwork { message: format!("{service}: {message}"), retry_after: None }
            }
            CommonError::Backend { service, message, is_retryable: false } => {
                Self::protocol(format!("{service}: {message}"))
            }
            CommonError::Persistence { operation, message } => {
                Self::storage(format!("{operation}: {message}"))
            }
            CommonError::Serialization { format, message } => {
                Self::protocol(format!("{format}: {message}"))
            }
            CommonError::Config { message } => Self::Config(message),
            CommonError::Validation { field, message } => Self::Config(format!("{field}: {message}")),
            CommonError::Internal { message } => Self::Internal(message),
        }
    }
}

impl From<DomainError> for OAuthError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Config(message) => Self::Config(message),
            DomainError::InvalidTokenSet(message) => Self::CorruptStore(message),
            other => Self::protocol(other.to_string()),
        }
    }
}
