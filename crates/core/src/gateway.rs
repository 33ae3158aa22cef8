//! Authenticated resource calls
//!
//! `execute` = rate-limit admission → valid access token → retried send.
//! A `401` forces one refresh and one more attempt with the new token; a
//! second `401` is surfaced as `Authentication`. Resource `401`s never move
//! the manager to `ReauthRequired`; only the token endpoint decides that.

use std::sync::Arc;

use tokenlink_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, RateLimiter, RetryExecutor, RetryPolicy,
};
use tokenlink_domain::{ApiRequest, ApiResponse, ReauthReason};
use tracing::{debug, info, instrument, warn};

use crate::error::{OAuthError, OAuthResult};
use crate::lifecycle::TokenLifecycleManager;
use crate::ports::ResourceTransport;

/// Longest response body excerpt carried in `OAuthError::Api`
const ERROR_BODY_LIMIT: usize = 256;

pub struct ApiGateway {
    limiter: Arc<RateLimiter>,
    manager: TokenLifecycleManager,
    transport: Arc<dyn ResourceTransport>,
    retry: RetryExecutor,
    breaker: CircuitBreaker,
}

impl ApiGateway {
    /// # Errors
    /// Returns `OAuthError::Config` for an invalid retry policy or breaker
    /// configuration.
    pub fn new(
        limiter: Arc<RateLimiter>,
        manager: TokenLifecycleManager,
        transport: Arc<dyn ResourceTransport>,
        policy: RetryPolicy,
        breaker: CircuitBreakerConfig,
    ) -> OAuthResult<Self> {
        policy.validate()?;
        Ok(Self {
            limiter,
            manager,
            transport,
            retry: RetryExecutor::new(policy),
            breaker: CircuitBreaker::new(breaker)?,
        })
    }

    /// Perform one authenticated call.
    ///
    /// # Errors
    /// - `NotAuthorized` / `ReauthRequired` when no grant is usable
    /// - `Authentication` when the resource rejects the refreshed token too
    /// - `RateLimited` / `TransientNetwork` after the retry budget is spent
    /// - `Api` for other non-success statuses
    #[instrument(skip(self, request), fields(method = request.method.as_str(), url = %request.url))]
    pub async fn execute(&self, request: &ApiRequest) -> OAuthResult<ApiResponse> {
        self.limiter.acquire(1).await?;
        let token = self.manager.get_valid_token().await?;

        match self.send_with_retry(request, &token).await {
            Err(OAuthError::Authentication { .. }) => {
                info!("Resource rejected access token, forcing refresh");
                let refreshed = self.manager.refresh_if_current(&token).await?;
                self.limiter.acquire(1).await?;
                self.send_with_retry(request, &refreshed.access_token).await
            }
            other => other,
        }
    }

    async fn send_with_retry(&self, request: &ApiRequest, bearer: &str) -> OAuthResult<ApiResponse> {
        self.retry.run(|| self.send_once(request, bearer)).await
    }

    async fn send_once(&self, request: &ApiRequest, bearer: &str) -> OAuthResult<ApiResponse> {
        self.breaker.check()?;

        let response = match self.transport.send(request, bearer).await {
            Ok(response) => response,
            Err(err) => {
                if matches!(err, OAuthError::TransientNetwork { .. }) {
                    self.breaker.record_failure();
                }
                return Err(err);
            }
        };

        let status = response.status;
        if (500..600).contains(&status) {
            self.breaker.record_failure();
            warn!(status, "Resource API server error");
            return Err(OAuthError::TransientNetwork {
                message: format!("resource API returned {status}"),
                retry_after: response.retry_after(),
            });
        }
        self.breaker.record_success();

        match status {
            _ if response.is_success() => {
                debug!(status, "Resource call succeeded");
                Ok(response)
            }
            401 => Err(OAuthError::authentication(
                ReauthReason::AppRevoked,
                "resource API rejected the access token",
            )),
            429 => Err(OAuthError::RateLimited {
                service: "resource-api".to_string(),
                retry_after: response.retry_after(),
            }),
            _ => {
                let mut message = response.text();
                if message.len() > ERROR_BODY_LIMIT {
                    let mut cut = ERROR_BODY_LIMIT;
                    while !message.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    message.truncate(cut);
                }
                Err(OAuthError::Api { status, message })
            }
        }
    }
}
