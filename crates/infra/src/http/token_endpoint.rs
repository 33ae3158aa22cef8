//! Token endpoint client
//!
//! Posts form-encoded grants to the authorization server and maps its
//! responses onto the `OAuthError` taxonomy:
//!
//! | Response                               | Error                                   |
//! |----------------------------------------|-----------------------------------------|
//! | 429                                    | `RateLimited` (with `Retry-After`)      |
//! | 5xx, timeout, connect failure          | `TransientNetwork`                      |
//! | `invalid_grant` on exchange            | `Protocol`                              |
//! | `invalid_grant` on refresh             | `Authentication` (AppRevoked / RefreshTokenExpired) |
//! | `invalid_client`                       | `Authentication` (ClientSecretRotated)  |
//! | `invalid_scope`                        | `Authentication` (ScopeChanged)         |
//! | other 401                              | `Authentication` (ClientSecretRotated)  |
//! | other 4xx                              | `Protocol`                              |

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, Response};
use tokenlink_core::ports::TokenEndpoint;
use tokenlink_core::{OAuthError, OAuthResult};
use tokenlink_domain::{
    parse_retry_after, Endpoints, LinkConfig, ReauthReason, TokenErrorResponse, TokenResponse,
};
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use super::client::HttpClientBuilder;
use crate::errors::InfraError;

const SERVICE: &str = "token-endpoint";

/// Which call produced an error response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grant {
    AuthorizationCode,
    RefreshToken,
    Revocation,
}

/// reqwest implementation of [`TokenEndpoint`].
pub struct HttpTokenEndpoint {
    client: Client,
    endpoints: Endpoints,
    client_id: String,
    client_secret: Zeroizing<String>,
}

impl fmt::Debug for HttpTokenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTokenEndpoint")
            .field("endpoints", &self.endpoints)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl HttpTokenEndpoint {
    /// Client for the configured endpoints, bounded by `request_timeout`.
    ///
    /// # Errors
    /// Returns `OAuthError::Config` if the HTTP client cannot be built.
    pub fn new(config: &LinkConfig) -> OAuthResult<Self> {
        let client = HttpClientBuilder::new().timeout(config.request_timeout).build()?;
        Ok(Self::with_client(
            client,
            config.endpoints(),
            config.client_id.clone(),
            config.client_secret.clone(),
        ))
    }

    pub fn with_client(
        client: Client,
        endpoints: Endpoints,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoints,
            client_id: client_id.into(),
            client_secret: Zeroizing::new(client_secret.into()),
        }
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        grant: Grant,
    ) -> OAuthResult<Response> {
        let response = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(InfraError::from)?;

        let status = response.status();
        debug!(?grant, status = status.as_u16(), "Token endpoint responded");
        if status.is_success() {
            return Ok(response);
        }
        Err(error_from_response(response, grant).await)
    }

    async fn request_tokens(
        &self,
        form: &[(&str, &str)],
        grant: Grant,
    ) -> OAuthResult<TokenResponse> {
        let response = self.post_form(&self.endpoints.token_url, form, grant).await?;
        let body = response.bytes().await.map_err(InfraError::from)?;
        // serde_json messages can quote input values; report position only.
        serde_json::from_slice(&body).map_err(|e| {
            OAuthError::protocol(format!(
                "malformed token response ({:?} error at line {} column {})",
                e.classify(),
                e.line(),
                e.column()
            ))
        })
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    #[instrument(skip_all, fields(grant = "authorization_code"))]
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> OAuthResult<TokenResponse> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        self.request_tokens(&form, Grant::AuthorizationCode).await
    }

    #[instrument(skip_all, fields(grant = "refresh_token"))]
    async fn refresh(&self, refresh_token: &str) -> OAuthResult<TokenResponse> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        self.request_tokens(&form, Grant::RefreshToken).await
    }

    #[instrument(skip_all)]
    async fn revoke(&self, token: &str) -> OAuthResult<()> {
        let Some(url) = self.endpoints.revocation_url.as_deref() else {
            warn!("No revocation endpoint configured, skipping revocation");
            return Ok(());
        };
        let form = [
            ("token", token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        self.post_form(url, &form, Grant::Revocation).await?;
        Ok(())
    }

    fn supports_revocation(&self) -> bool {
        self.endpoints.revocation_url.is_some()
    }
}

async fn error_from_response(response: Response, grant: Grant) -> OAuthError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, Utc::now()));
    let body = response
        .bytes()
        .await
        .ok()
        .and_then(|bytes| serde_json::from_slice::<TokenErrorResponse>(&bytes).ok());
    map_endpoint_error(status, retry_after, body.as_ref(), grant)
}

pub(crate) fn map_endpoint_error(
    status: u16,
    retry_after: Option<Duration>,
    body: Option<&TokenErrorResponse>,
    grant: Grant,
) -> OAuthError {
    if status == 429 {
        return OAuthError::RateLimited { service: SERVICE.to_string(), retry_after };
    }
    if (500..600).contains(&status) {
        return OAuthError::TransientNetwork {
            message: format!("token endpoint returned HTTP {status}"),
            retry_after,
        };
    }

    let Some(body) = body else {
        return if status == 401 {
            OAuthError::authentication(
                ReauthReason::ClientSecretRotated,
                "token endpoint returned HTTP 401",
            )
        } else {
            OAuthError::protocol(format!("token endpoint returned HTTP {status}"))
        };
    };

    let description = body.error_description.as_deref().unwrap_or("");
    let message = if description.is_empty() {
        body.error.clone()
    } else {
        format!("{}: {description}", body.error)
    };

    match (body.error.as_str(), grant) {
        ("invalid_grant", Grant::RefreshToken) => {
            let reason = if description.to_ascii_lowercase().contains("expired") {
                ReauthReason::RefreshTokenExpired
            } else {
                ReauthReason::AppRevoked
            };
            OAuthError::authentication(reason, message)
        }
        ("invalid_client", _) => {
            OAuthError::authentication(ReauthReason::ClientSecretRotated, message)
        }
        ("invalid_scope", _) => OAuthError::authentication(ReauthReason::ScopeChanged, message),
        (_, _) if status == 401 => {
            OAuthError::authentication(ReauthReason::ClientSecretRotated, message)
        }
        (code, _) => OAuthError::protocol_code(code, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(error: &str, description: Option<&str>) -> TokenErrorResponse {
        TokenErrorResponse {
            error: error.to_string(),
            error_description: description.map(str::to_string),
        }
    }

    fn reason(err: &OAuthError) -> Option<ReauthReason> {
        match err {
            OAuthError::Authentication { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    #[test]
    fn test_invalid_grant_depends_on_grant() {
        let revoked = body("invalid_grant", Some("The refresh token is invalid"));
        let expired = body("invalid_grant", Some("Refresh token has EXPIRED"));

        let err = map_endpoint_error(400, None, Some(&revoked), Grant::AuthorizationCode);
        assert!(matches!(&err, OAuthError::Protocol { code: Some(c), .. } if c == "invalid_grant"));

        let err = map_endpoint_error(400, None, Some(&revoked), Grant::RefreshToken);
        assert_eq!(reason(&err), Some(ReauthReason::AppRevoked));

        let err = map_endpoint_error(400, None, Some(&expired), Grant::RefreshToken);
        assert_eq!(reason(&err), Some(ReauthReason::RefreshTokenExpired));
    }

    #[test]
    fn test_client_and_scope_errors() {
        let err = map_endpoint_error(
            401,
            None,
            Some(&body("invalid_client", None)),
            Grant::RefreshToken,
        );
        assert_eq!(reason(&err), Some(ReauthReason::ClientSecretRotated));

        let err = map_endpoint_error(
            400,
            None,
            Some(&body("invalid_scope", None)),
            Grant::AuthorizationCode,
        );
        assert_eq!(reason(&err), Some(ReauthReason::ScopeChanged));

        let err = map_endpoint_error(401, None, None, Grant::Revocation);
        assert_eq!(reason(&err), Some(ReauthReason::ClientSecretRotated));
    }

    #[test]
    fn test_status_driven_errors() {
        let err = map_endpoint_error(429, Some(Duration::from_secs(7)), None, Grant::RefreshToken);
        assert_eq!(
            err,
            OAuthError::RateLimited {
                service: "token-endpoint".into(),
                retry_after: Some(Duration::from_secs(7)),
            }
        );

        let err = map_endpoint_error(
            503,
            None,
            Some(&body("invalid_grant", None)),
            Grant::RefreshToken,
        );
        assert!(matches!(err, OAuthError::TransientNetwork { .. }));

        let err = map_endpoint_error(
            400,
            None,
            Some(&body("unsupported_grant_type", Some("nope"))),
            Grant::AuthorizationCode,
        );
        assert_eq!(err, OAuthError::protocol_code("unsupported_grant_type", "unsupported_grant_type: nope"));

        let err = map_endpoint_error(404, None, None, Grant::Revocation);
        assert!(matches!(err, OAuthError::Protocol { code: None, .. }));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let endpoint = HttpTokenEndpoint::with_client(
            Client::new(),
            tokenlink_domain::Region::NorthAmerica.endpoints(),
            "client",
            "very-secret-value",
        );
        let debug = format!("{endpoint:?}");
        assert!(!debug.contains("very-secret-value"));
        assert!(endpoint.supports_revocation());
    }
}
