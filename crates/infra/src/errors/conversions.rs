//! Conversions from external infrastructure errors into `OAuthError`.

use std::io::{Error as IoError, ErrorKind};

use reqwest::Error as HttpError;
use tokenlink_core::OAuthError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the core error.
#[derive(Debug)]
pub struct InfraError(pub OAuthError);

impl From<InfraError> for OAuthError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<OAuthError> for InfraError {
    fn from(value: OAuthError) -> Self {
        InfraError(value)
    }
}

trait IntoOAuthError {
    fn into_oauth(self) -> OAuthError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → OAuthError */
/* -------------------------------------------------------------------------- */

impl IntoOAuthError for HttpError {
    fn into_oauth(self) -> OAuthError {
        if self.is_timeout() {
            return OAuthError::transient("HTTP request timed out");
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return OAuthError::transient("HTTP connection failure");
        }

        if self.is_decode() {
            return OAuthError::protocol("malformed response body");
        }

        if self.is_builder() {
            return OAuthError::Config(format!("invalid HTTP request: {}", self.without_url()));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                429 => OAuthError::RateLimited { service: "http".into(), retry_after: None },
                500..=599 => OAuthError::transient(message),
                _ => OAuthError::Api { status: code, message },
            };
        }

        // Request URLs may carry query parameters; keep them out of messages.
        OAuthError::transient(self.without_url().to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_oauth())
    }
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → OAuthError */
/* -------------------------------------------------------------------------- */

impl IntoOAuthError for IoError {
    fn into_oauth(self) -> OAuthError {
        match self.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => {
                OAuthError::storage_timeout(format!("storage I/O timed out: {self}"))
            }
            ErrorKind::PermissionDenied => {
                OAuthError::storage(format!("storage permission denied: {self}"))
            }
            _ => OAuthError::storage(format!("storage I/O failed: {self}")),
        }
    }
}

impl From<IoError> for InfraError {
    fn from(value: IoError) -> Self {
        InfraError(value.into_oauth())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
