//! Authorization flow engine

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tokenlink_common::auth::{CsrfStateGuard, PkceEngine, PkcePair};
use tokenlink_common::resilience::{Clock, SystemClock};
use tokenlink_domain::constants::DEFAULT_FLOW_TTL;
use tokenlink_domain::{CallbackParams, FlowStatus, TokenSet};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{OAuthError, OAuthResult};
use crate::ports::TokenEndpoint;

/// URL to present to the user plus the handle for `complete()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub flow_id: Uuid,
}

/// In-flight authorization attempt; never persisted.
struct FlowState {
    state_token: String,
    pkce: PkcePair,
    redirect_uri: String,
    created_at: Instant,
    expires_at: Instant,
}

enum FlowEntry {
    Pending(FlowState),
    Exchanging { since: Instant },
    Finished { status: FlowStatus, at: Instant },
}

/// Records the outcome of a code exchange when dropped, so a `complete`
/// future cancelled mid-exchange still leaves a finished flow behind.
struct ExchangeGuard<'a, C: Clock> {
    engine: &'a AuthorizationFlowEngine<C>,
    flow_id: Uuid,
    outcome: Option<FlowStatus>,
}

impl<C: Clock> Drop for ExchangeGuard<'_, C> {
    fn drop(&mut self) {
        let status = self.outcome.unwrap_or_else(|| {
            warn!(flow_id = %self.flow_id, "Authorization flow abandoned during code exchange");
            FlowStatus::Failed
        });
        let at = self.engine.clock.now();
        self.engine.flows.insert(self.flow_id, FlowEntry::Finished { status, at });
    }
}

/// Drives authorization attempts from `begin` to a [`TokenSet`].
///
/// Flows are independent; each `flow_id` can be completed at most once.
pub struct AuthorizationFlowEngine<C: Clock = SystemClock> {
    authorization_url: String,
    endpoint: Arc<dyn TokenEndpoint>,
    ttl: Duration,
    clock: C,
    flows: DashMap<Uuid, FlowEntry>,
}

impl AuthorizationFlowEngine<SystemClock> {
    pub fn new(authorization_url: impl Into<String>, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self::with_clock(authorization_url, endpoint, DEFAULT_FLOW_TTL, SystemClock)
    }
}

impl<C: Clock> AuthorizationFlowEngine<C> {
    pub fn with_clock(
        authorization_url: impl Into<String>,
        endpoint: Arc<dyn TokenEndpoint>,
        ttl: Duration,
        clock: C,
    ) -> Self {
        Self {
            authorization_url: authorization_url.into(),
            endpoint,
            ttl,
            clock,
            flows: DashMap::new(),
        }
    }

    /// Set the flow lifetime
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Start a flow and build its authorization URL.
    ///
    /// # Errors
    /// Returns `OAuthError::CryptoFailure` if the entropy source fails.
    #[instrument(skip(self, scopes, client_id, redirect_uri))]
    pub fn begin<I, S>(
        &self,
        scopes: I,
        client_id: &str,
        redirect_uri: &str,
    ) -> OAuthResult<AuthorizationRequest>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.purge_expired();

        let pkce = PkceEngine::generate()?;
        let state_token = CsrfStateGuard::generate()?;
        let scope = scopes.into_iter().map(|s| s.as_ref().to_string()).collect::<Vec<_>>().join(" ");

        let params = [
            ("client_id", client_id),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state_token.as_str()),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", pkce.method),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.authorization_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{separator}{query}", self.authorization_url);

        let now = self.clock.now();
        let flow_id = Uuid::now_v7();
        self.flows.insert(
            flow_id,
            FlowEntry::Pending(FlowState {
                state_token,
                pkce,
                redirect_uri: redirect_uri.to_string(),
                created_at: now,
                expires_at: now + self.ttl,
            }),
        );

        info!(%flow_id, scope = %scope, "Authorization flow started");
        Ok(AuthorizationRequest { url, flow_id })
    }

    /// Validate the callback and exchange the code.
    ///
    /// The flow is consumed before any check runs, so a second call for the
    /// same `flow_id` always fails with `FlowNotFound`.
    ///
    /// # Errors
    /// - `FlowNotFound` for unknown or already completed flows
    /// - `Protocol` for a server-reported error, state mismatch, missing code
    ///   or an unusable token response
    /// - `FlowExpired` when the flow outlived its TTL
    /// - any error of the token endpoint
    #[instrument(skip(self, callback))]
    pub async fn complete(&self, flow_id: Uuid, callback: &CallbackParams) -> OAuthResult<TokenSet> {
        let flow = self.take_pending(flow_id)?;
        let mut guard = ExchangeGuard { engine: self, flow_id, outcome: None };
        let result = self.validate_and_exchange(flow_id, flow, callback).await;

        guard.outcome = Some(if result.is_ok() { FlowStatus::Complete } else { FlowStatus::Failed });
        drop(guard);
        match &result {
            Ok(_) => info!(%flow_id, "Authorization flow complete"),
            Err(err) => warn!(%flow_id, error = %err, "Authorization flow failed"),
        }
        result
    }

    async fn validate_and_exchange(
        &self,
        flow_id: Uuid,
        flow: FlowState,
        callback: &CallbackParams,
    ) -> OAuthResult<TokenSet> {
        if let Some(error) = &callback.error {
            let description = callback.error_description.as_deref().unwrap_or("no description");
            return Err(OAuthError::protocol_code(
                error.clone(),
                format!("authorization server returned '{error}': {description}"),
            ));
        }

        let received = callback.state.as_deref().unwrap_or_default();
        if !CsrfStateGuard::validate(&flow.state_token, received) {
            return Err(OAuthError::protocol("state parameter does not match"));
        }

        if self.clock.now() >= flow.expires_at {
            return Err(OAuthError::FlowExpired(flow_id));
        }

        let code = callback
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuthError::protocol("callback carries no authorization code"))?;

        debug!(
            %flow_id,
            age_ms = self.clock.now().saturating_duration_since(flow.created_at).as_millis() as u64,
            "Exchanging authorization code"
        );
        let response =
            self.endpoint.exchange_code(code, &flow.pkce.verifier, &flow.redirect_uri).await?;

        // A long-lived credential is required; no previous refresh token exists.
        TokenSet::from_response(response, None, Utc::now())
            .map_err(|e| OAuthError::protocol(e.to_string()))
    }

    fn take_pending(&self, flow_id: Uuid) -> OAuthResult<FlowState> {
        let mut entry = self.flows.get_mut(&flow_id).ok_or(OAuthError::FlowNotFound(flow_id))?;
        if !matches!(*entry, FlowEntry::Pending(_)) {
            return Err(OAuthError::FlowNotFound(flow_id));
        }
        match std::mem::replace(&mut *entry, FlowEntry::Exchanging { since: self.clock.now() }) {
            FlowEntry::Pending(flow) => Ok(flow),
            _ => Err(OAuthError::FlowNotFound(flow_id)),
        }
    }

    /// Status of a known flow. Finished flows are reported until purged.
    pub fn status(&self, flow_id: Uuid) -> Option<FlowStatus> {
        self.flows.get(&flow_id).map(|entry| match &*entry {
            FlowEntry::Pending(_) => FlowStatus::AwaitingCallback,
            FlowEntry::Exchanging { .. } => FlowStatus::Exchanging,
            FlowEntry::Finished { status, .. } => *status,
        })
    }

    /// Flows still waiting for their callback
    pub fn pending_flows(&self) -> usize {
        self.flows.iter().filter(|e| matches!(e.value(), FlowEntry::Pending(_))).count()
    }

    /// Drop expired pending flows, plus exchanging and finished records
    /// older than the TTL.
    ///
    /// Returns the number of pending flows removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut expired = 0;
        self.flows.retain(|_, entry| match entry {
            FlowEntry::Pending(flow) if now >= flow.expires_at => {
                expired += 1;
                false
            }
            FlowEntry::Pending(_) => true,
            FlowEntry::Exchanging { since: at } | FlowEntry::Finished { at, .. } => {
                now.saturating_duration_since(*at) < self.ttl
            }
        });
        if expired > 0 {
            debug!(expired, "Purged expired authorization flows");
        }
        expired
    }
}
