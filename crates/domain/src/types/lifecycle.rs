//! Token lifecycle states and reauthorization events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_status_strings;

/// Derived state of the token owned by the lifecycle manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Token is usable beyond the safety margin
    Valid,
    /// A refresh is in flight
    Refreshing,
    /// Token is inside the safety margin or past expiry
    Expired,
    /// No usable grant; a new authorization flow is needed
    ReauthRequired,
}

impl_status_strings!(LifecycleState {
    Valid => "valid",
    Refreshing => "refreshing",
    Expired => "expired",
    ReauthRequired => "reauth_required",
});

/// Why reauthorization became necessary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReauthReason {
    RefreshTokenExpired,
    AppRevoked,
    ClientSecretRotated,
    ScopeChanged,
    StoreCorrupted,
    RegionalChange,
}

impl_status_strings!(ReauthReason {
    RefreshTokenExpired => "refresh_token_expired",
    AppRevoked => "app_revoked",
    ClientSecretRotated => "client_secret_rotated",
    ScopeChanged => "scope_changed",
    StoreCorrupted => "store_corrupted",
    RegionalChange => "regional_change",
});

impl ReauthReason {
    /// Prompt shown to the user by the host.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::RefreshTokenExpired => "Your sign-in has expired. Please authorize again.",
            Self::AppRevoked => "Access was revoked. Please authorize again.",
            Self::ClientSecretRotated => {
                "The client credentials were rejected. Update them and authorize again."
            }
            Self::ScopeChanged => "The requested permissions changed. Please authorize again.",
            Self::StoreCorrupted => "Stored credentials could not be read. Please authorize again.",
            Self::RegionalChange => "The account region changed. Please authorize again.",
        }
    }
}

/// Notification raised when the manager enters `ReauthRequired`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReauthEvent {
    pub reason: ReauthReason,
    pub occurred_at: DateTime<Utc>,
    pub message: String,
}

impl ReauthEvent {
    #[must_use]
    pub fn new(reason: ReauthReason, message: impl Into<String>) -> Self {
        Self { reason, occurred_at: Utc::now(), message: message.into() }
    }
}
