//! Shared reqwest client construction.
//!
//! Every outbound call is bounded by the builder's timeout, so a hung server
//! surfaces as `OAuthError::TransientNetwork`. Retries are not performed
//! here; the core services own retry policy.

use std::time::Duration;

use reqwest::Client;
use tokenlink_core::{OAuthError, OAuthResult};
use tokenlink_domain::constants::DEFAULT_REQUEST_TIMEOUT;

const USER_AGENT: &str = concat!("tokenlink/", env!("CARGO_PKG_VERSION"));

/// Builder for the reqwest [`Client`] used by the adapters.
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: String,
    accept_invalid_certs: bool,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
            accept_invalid_certs: false,
        }
    }
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total time allowed for one request, including the body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Test-only helper to allow insecure TLS (e.g., self-signed certs).
    #[cfg(test)]
    pub fn accept_invalid_certs(mut self, enabled: bool) -> Self {
        self.accept_invalid_certs = enabled;
        self
    }

    /// # Errors
    /// Returns `OAuthError::Config` if the TLS backend cannot be initialised.
    pub fn build(self) -> OAuthResult<Client> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .redirect(reqwest::redirect::Policy::none());

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|err| OAuthError::Config(format!("failed to build HTTP client: {err}")))
    }
}
