//! Authorization flow types

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{impl_status_strings, DomainError, Result};

/// Authorization flow state machine
///
/// `Idle → AwaitingCallback → Exchanging → Complete | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Idle,
    AwaitingCallback,
    Exchanging,
    Complete,
    Failed,
}

impl_status_strings!(FlowStatus {
    Idle => "idle",
    AwaitingCallback => "awaiting_callback",
    Exchanging => "exchanging",
    Complete => "complete",
    Failed => "failed",
});

impl FlowStatus {
    /// Terminal states release the flow's state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Successful callback carrying a code.
    #[must_use]
    pub fn success(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self { code: Some(code.into()), state: Some(state.into()), ..Self::default() }
    }

    /// Callback reporting an authorization-server error.
    #[must_use]
    pub fn failure(error: impl Into<String>, state: Option<String>) -> Self {
        Self { error: Some(error.into()), state, ..Self::default() }
    }

    /// Parse the full redirect URL captured by the host.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidCallback` if `raw` is not an absolute URL.
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| DomainError::InvalidCallback(format!("invalid redirect URL: {e}")))?;
        Ok(Self::from_pairs(url.query_pairs()))
    }

    /// Parse a bare query string, with or without the leading `?`.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    fn from_pairs<'a>(
        pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
    ) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            // First occurrence wins
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}
