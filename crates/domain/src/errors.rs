//! Error types for domain validation

use thiserror::Error;

/// Errors raised while validating domain data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Invalid token set: {0}")]
    InvalidTokenSet(String),

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, DomainError>;
