//! Token sets and token endpoint payloads

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::BEARER_TOKEN_TYPE;
use crate::{DomainError, Result};

/// Credentials issued by the authorization server.
///
/// Invariant: `expires_at > issued_at`. Constructors enforce it; values
/// deserialized from the store are re-checked with [`TokenSet::validate`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Space-separated scopes granted by the server, when reported
    pub scope: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TokenSet {
    /// Build a token set, rejecting non-positive lifetimes.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTokenSet` if `expires_at <= issued_at` or
    /// either token is empty.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        token_type: impl Into<String>,
        scope: Option<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self> {
        let set = Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_type: token_type.into(),
            scope,
            issued_at,
            expires_at,
        };
        set.validate()?;
        Ok(set)
    }

    /// Build a token set from an endpoint response received at `now`.
    ///
    /// The response's refresh token wins when present; otherwise
    /// `previous_refresh` is kept. A response without either is rejected.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTokenResponse` when the response fails
    /// [`TokenResponse::validate`] or no refresh token is available.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        response.validate()?;

        let refresh_token = match (response.refresh_token, previous_refresh) {
            (Some(rotated), _) if !rotated.is_empty() => rotated,
            (_, Some(previous)) if !previous.is_empty() => previous.to_string(),
            _ => {
                return Err(DomainError::InvalidTokenResponse(
                    "response carries no refresh_token".to_string(),
                ))
            }
        };

        let lifetime = TimeDelta::try_seconds(response.expires_in).ok_or_else(|| {
            DomainError::InvalidTokenResponse("expires_in out of range".to_string())
        })?;
        let expires_at = now.checked_add_signed(lifetime).ok_or_else(|| {
            DomainError::InvalidTokenResponse("expires_in out of range".to_string())
        })?;

        Self::new(
            response.access_token,
            refresh_token,
            response.token_type,
            response.scope,
            now,
            expires_at,
        )
        .map_err(|e| DomainError::InvalidTokenResponse(e.to_string()))
    }

    /// Check the structural invariants.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTokenSet` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.access_token.is_empty() {
            return Err(DomainError::InvalidTokenSet("access_token is empty".to_string()));
        }
        if self.refresh_token.is_empty() {
            return Err(DomainError::InvalidTokenSet("refresh_token is empty".to_string()));
        }
        if self.expires_at <= self.issued_at {
            return Err(DomainError::InvalidTokenSet(
                "expires_at must be after issued_at".to_string(),
            ));
        }
        Ok(())
    }

    /// True when the token expires before `now + margin`.
    #[must_use]
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        let margin = TimeDelta::from_std(margin).unwrap_or(TimeDelta::MAX);
        match now.checked_add_signed(margin) {
            Some(deadline) => self.expires_at <= deadline,
            None => true,
        }
    }

    /// Time left until expiry; zero once expired.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Granted scopes, split on whitespace.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.as_deref().unwrap_or_default().split_whitespace()
    }
}

/// Successful token endpoint response (RFC 6749 §5.1).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

impl TokenResponse {
    /// Reject responses that cannot produce a usable token set.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTokenResponse` for an empty access token,
    /// a non-Bearer token type or a non-positive `expires_in`.
    pub fn validate(&self) -> Result<()> {
        if self.access_token.is_empty() {
            return Err(DomainError::InvalidTokenResponse("access_token is empty".to_string()));
        }
        if !self.token_type.eq_ignore_ascii_case(BEARER_TOKEN_TYPE) {
            return Err(DomainError::InvalidTokenResponse(format!(
                "unsupported token_type: {}",
                self.token_type
            )));
        }
        if self.expires_in <= 0 {
            return Err(DomainError::InvalidTokenResponse(format!(
                "expires_in must be positive, got {}",
                self.expires_in
            )));
        }
        Ok(())
    }
}

/// Error body returned by the token endpoint (RFC 6749 §5.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "Atza|access".to_string(),
            refresh_token: refresh.map(str::to_string),
            token_type: "bearer".to_string(),
            expires_in: 3600,
            scope: Some("smart_home profile".to_string()),
        }
    }

    #[test]
    fn test_from_response_computes_expiry() {
        let now = Utc::now();
        let set = TokenSet::from_response(response(Some("Atzr|r1")), None, now).expect("valid");
        assert_eq!(set.issued_at, now);
        assert_eq!(set.expires_at - now, TimeDelta::seconds(3600));
        assert_eq!(set.refresh_token, "Atzr|r1");
        assert_eq!(set.scopes().collect::<Vec<_>>(), vec!["smart_home", "profile"]);
    }

    /// Validates refresh-token rotation handling.
    ///
    /// Assertions:
    /// - A rotated refresh token replaces the previous one.
    /// - A missing refresh token keeps the previous one.
    /// - Missing everywhere is rejected.
    #[test]
    fn test_refresh_token_rotation() {
        let now = Utc::now();
        let rotated =
            TokenSet::from_response(response(Some("new")), Some("old"), now).expect("valid");
        assert_eq!(rotated.refresh_token, "new");

        let kept = TokenSet::from_response(response(None), Some("old"), now).expect("valid");
        assert_eq!(kept.refresh_token, "old");

        assert!(TokenSet::from_response(response(None), None, now).is_err());
    }

    #[test]
    fn test_response_validation() {
        let mut bad = response(Some("r"));
        bad.token_type = "mac".to_string();
        assert!(bad.validate().is_err());

        let mut bad = response(Some("r"));
        bad.expires_in = 0;
        assert!(bad.validate().is_err());

        let mut bad = response(Some("r"));
        bad.access_token.clear();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_new_rejects_non_positive_lifetime() {
        let now = Utc::now();
        let err = TokenSet::new("a", "r", "Bearer", None, now, now).expect_err("zero lifetime");
        assert!(matches!(err, DomainError::InvalidTokenSet(_)));
    }

    #[test]
    fn test_expires_within_margin() {
        let now = Utc::now();
        let set = TokenSet::new("a", "r", "Bearer", None, now, now + TimeDelta::seconds(30))
            .expect("valid");
        assert!(set.expires_within(Duration::from_secs(60), now));
        assert!(!set.expires_within(Duration::from_secs(10), now));
        assert_eq!(set.remaining(now), Duration::from_secs(30));
        assert_eq!(set.remaining(now + TimeDelta::seconds(90)), Duration::ZERO);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let now = Utc::now();
        let set = TokenSet::from_response(response(Some("Atzr|secret")), None, now).expect("ok");
        let debug = format!("{set:?}");
        assert!(!debug.contains("Atza|access"));
        assert!(!debug.contains("Atzr|secret"));
    }
}
