//! Port interfaces
//!
//! These traits define the boundaries between the core services and the
//! infrastructure adapters (HTTP clients, file storage, host callbacks).

use async_trait::async_trait;
use tokenlink_domain::{ApiRequest, ApiResponse, ReauthEvent, TokenResponse};

use crate::error::OAuthResult;

/// Client for the authorization server's token and revocation endpoints
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Redeem an authorization code (`grant_type=authorization_code`)
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> OAuthResult<TokenResponse>;

    /// Obtain new tokens (`grant_type=refresh_token`)
    async fn refresh(&self, refresh_token: &str) -> OAuthResult<TokenResponse>;

    /// Revoke a token; only called when [`supports_revocation`](Self::supports_revocation)
    async fn revoke(&self, token: &str) -> OAuthResult<()>;

    /// Whether a revocation endpoint is configured
    fn supports_revocation(&self) -> bool;
}

/// Storage for the single encrypted token blob
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Read the blob; `None` when nothing has been written
    async fn read(&self) -> OAuthResult<Option<Vec<u8>>>;

    /// Replace the blob atomically
    async fn write(&self, bytes: &[u8]) -> OAuthResult<()>;

    /// Remove the blob; succeeds when it is already absent
    async fn delete(&self) -> OAuthResult<()>;
}

/// Host callback raised when the lifecycle manager enters `ReauthRequired`
pub trait ReauthObserver: Send + Sync {
    fn on_reauth_required(&self, event: &ReauthEvent);
}

/// Sends one authenticated request to the resource API
#[async_trait]
pub trait ResourceTransport: Send + Sync {
    /// Send `request` with `bearer` as the access token.
    ///
    /// Transport failures (timeout, connection refused) are returned as
    /// `OAuthError::TransientNetwork`; every HTTP status is an `Ok` response.
    async fn send(&self, request: &ApiRequest, bearer: &str) -> OAuthResult<ApiResponse>;
}
