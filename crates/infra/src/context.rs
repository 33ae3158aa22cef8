//! Per-installation context
//!
//! One [`Installation`] owns exactly one store, lifecycle manager, rate
//! limiter, flow engine and gateway. Hosts hold the context (or clone the
//! `Arc` handles it hands out) instead of looking services up globally.

use std::sync::Arc;
use std::time::Duration;

use tokenlink_common::resilience::{CircuitBreakerConfig, RateLimiter};
use tokenlink_core::auth::{AuthorizationFlowEngine, AuthorizationRequest};
use tokenlink_core::ports::{BlobStorage, ReauthObserver, ResourceTransport, TokenEndpoint};
use tokenlink_core::settings::{rate_limiter_config, retry_policy};
use tokenlink_core::{
    ApiGateway, LifecycleSettings, OAuthResult, RefreshScheduler, TokenLifecycleManager,
    TokenStore,
};
use tokenlink_domain::{ApiRequest, ApiResponse, CallbackParams, LifecycleState, LinkConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::http::{HttpTokenEndpoint, ReqwestTransport};
use crate::storage::FileBlobStorage;

/// Services for one authorized installation.
pub struct Installation {
    config: LinkConfig,
    flows: AuthorizationFlowEngine,
    store: Arc<TokenStore>,
    manager: TokenLifecycleManager,
    limiter: Arc<RateLimiter>,
    gateway: Arc<ApiGateway>,
    scheduler: Arc<RefreshScheduler>,
}

impl Installation {
    /// Build an installation backed by reqwest and the file store at
    /// `config.store_path`.
    ///
    /// # Errors
    /// Returns `OAuthError::Config` if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: LinkConfig, observer: Option<Arc<dyn ReauthObserver>>) -> OAuthResult<Self> {
        config.validate()?;
        let endpoint = Arc::new(HttpTokenEndpoint::new(&config)?);
        let storage = Arc::new(FileBlobStorage::new(config.store_path.clone()));
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout)?);

        let installation = Self::with_adapters(config, endpoint, storage, transport)?;
        if let Some(observer) = observer {
            installation.subscribe(observer);
        }
        Ok(installation)
    }

    /// Build an installation from explicit adapters.
    ///
    /// # Errors
    /// Returns `OAuthError::Config` for an invalid configuration.
    pub fn with_adapters(
        config: LinkConfig,
        endpoint: Arc<dyn TokenEndpoint>,
        storage: Arc<dyn BlobStorage>,
        transport: Arc<dyn ResourceTransport>,
    ) -> OAuthResult<Self> {
        config.validate()?;
        let endpoints = config.endpoints();

        let flows = AuthorizationFlowEngine::new(endpoints.authorization_url, endpoint.clone())
            .with_ttl(config.flow_ttl);
        let store = Arc::new(TokenStore::new(config.installation_secret.as_bytes(), storage));
        let manager = TokenLifecycleManager::new(
            endpoint,
            store.clone(),
            LifecycleSettings::from_config(&config),
        );
        let limiter = Arc::new(RateLimiter::new(rate_limiter_config(&config))?);
        let policy = retry_policy(&config.retry_policy);
        let gateway = Arc::new(ApiGateway::new(
            limiter.clone(),
            manager.clone(),
            transport,
            policy.clone(),
            CircuitBreakerConfig::default(),
        )?);
        let scheduler =
            Arc::new(RefreshScheduler::new(manager.clone(), policy, config.refresh_jitter));

        info!(client_id = %config.client_id, region = %config.region, "Installation configured");
        Ok(Self { config, flows, store, manager, limiter, gateway, scheduler })
    }

    /// Load the persisted token set, if any, and report the resulting state.
    ///
    /// A corrupt blob is discarded and leaves the installation in
    /// `ReauthRequired`; that is not an error.
    ///
    /// # Errors
    /// Returns storage errors other than corruption.
    #[instrument(skip(self))]
    pub async fn start(&self) -> OAuthResult<LifecycleState> {
        let restored = self.manager.restore().await?;
        let state = self.manager.state();
        info!(restored, %state, "Installation started");
        Ok(state)
    }

    /// Start an authorization flow with the configured scopes.
    ///
    /// # Errors
    /// Returns `OAuthError::CryptoFailure` if no randomness is available.
    pub fn begin_authorization(&self) -> OAuthResult<AuthorizationRequest> {
        self.flows.begin(&self.config.scopes, &self.config.client_id, &self.config.redirect_uri)
    }

    /// Complete a flow and install the resulting tokens.
    ///
    /// # Errors
    /// Propagates flow errors from [`AuthorizationFlowEngine::complete`] and
    /// persistence errors from [`TokenLifecycleManager::install`].
    #[instrument(skip(self, callback))]
    pub async fn complete_authorization(
        &self,
        flow_id: Uuid,
        callback: &CallbackParams,
    ) -> OAuthResult<()> {
        let tokens = self.flows.complete(flow_id, callback).await?;
        self.manager.install(tokens).await?;
        info!("Installation authorized");
        Ok(())
    }

    /// Authenticated resource call through the gateway.
    ///
    /// # Errors
    /// See [`ApiGateway::execute`].
    pub async fn execute(&self, request: &ApiRequest) -> OAuthResult<ApiResponse> {
        self.gateway.execute(request).await
    }

    /// Register a reauthorization observer.
    pub fn subscribe(&self, observer: Arc<dyn ReauthObserver>) {
        self.manager.subscribe(observer);
    }

    /// Run proactive refreshes on a tokio task until `cancel` fires.
    pub fn spawn_refresh_task(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    }

    /// Revoke the grant and destroy local tokens.
    ///
    /// # Errors
    /// Returns storage errors from deleting the blob.
    pub async fn revoke(&self) -> OAuthResult<()> {
        self.manager.revoke().await
    }

    pub fn state(&self) -> LifecycleState {
        self.manager.state()
    }

    /// Poll cadence the host's coordinator should use.
    pub fn update_interval(&self) -> Duration {
        self.config.update_interval
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn flows(&self) -> &AuthorizationFlowEngine {
        &self.flows
    }

    pub fn manager(&self) -> &TokenLifecycleManager {
        &self.manager
    }

    pub fn store(&self) -> Arc<TokenStore> {
        self.store.clone()
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    pub fn gateway(&self) -> Arc<ApiGateway> {
        self.gateway.clone()
    }

    pub fn scheduler(&self) -> Arc<RefreshScheduler> {
        self.scheduler.clone()
    }
}

#[cfg(test)]
mod tests {
    use tokenlink_core::testing::{
        token_response, token_set_expiring_in, MemoryBlobStorage, MockTokenEndpoint,
        MockTransport, RecordingObserver,
    };
    use tokenlink_domain::ReauthReason;

    use super::*;

    fn config() -> LinkConfig {
        LinkConfig::new("client", "secret", "https://example.com/cb", "installation-secret")
    }

    fn installation(
        endpoint: Arc<MockTokenEndpoint>,
        storage: Arc<MemoryBlobStorage>,
        transport: Arc<MockTransport>,
    ) -> Installation {
        Installation::with_adapters(config(), endpoint, storage, transport).expect("installation")
    }

    fn state_of(url: &str) -> String {
        url::Url::parse(url)
            .expect("authorization url")
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .expect("state parameter")
    }

    #[tokio::test]
    async fn test_authorize_then_call() {
        let endpoint = Arc::new(MockTokenEndpoint::new());
        let storage = Arc::new(MemoryBlobStorage::new());
        let transport = Arc::new(MockTransport::new());
        let installation = installation(endpoint.clone(), storage.clone(), transport.clone());

        assert_eq!(installation.start().await.expect("start"), LifecycleState::ReauthRequired);

        let request = installation.begin_authorization().expect("begin");
        assert!(request.url.contains("scope=smart_home"));
        endpoint.push_exchange(Ok(token_response("access-a", Some("refresh-a"), 3600)));
        installation
            .complete_authorization(
                request.flow_id,
                &CallbackParams::success("code-1", state_of(&request.url)),
            )
            .await
            .expect("complete");

        assert_eq!(installation.state(), LifecycleState::Valid);
        assert!(storage.contents().is_some(), "tokens persisted");

        let response = installation
            .execute(&ApiRequest::get("https://api.example.com/devices"))
            .await
            .expect("execute");
        assert_eq!(response.status, 200);
        assert_eq!(transport.bearers(), vec!["access-a".to_string()]);
    }

    #[tokio::test]
    async fn test_restart_restores_tokens() {
        let endpoint = Arc::new(MockTokenEndpoint::new());
        let storage = Arc::new(MemoryBlobStorage::new());
        let first = installation(endpoint.clone(), storage.clone(), Arc::new(MockTransport::new()));
        first.manager().install(token_set_expiring_in("a", "r", 3600)).await.expect("install");

        let second = installation(endpoint, storage, Arc::new(MockTransport::new()));
        assert_eq!(second.start().await.expect("start"), LifecycleState::Valid);
        assert_eq!(second.manager().get_valid_token().await.expect("token"), "a");
    }

    #[tokio::test]
    async fn test_corrupt_store_requires_reauth() {
        let storage = Arc::new(MemoryBlobStorage::new());
        storage.set_contents(b"not a blob".to_vec());
        let installation = installation(
            Arc::new(MockTokenEndpoint::new()),
            storage.clone(),
            Arc::new(MockTransport::new()),
        );
        let observer = Arc::new(RecordingObserver::new());
        installation.subscribe(observer.clone());

        assert_eq!(installation.start().await.expect("start"), LifecycleState::ReauthRequired);
        assert_eq!(observer.reasons(), vec![ReauthReason::StoreCorrupted]);
        assert!(storage.contents().is_none(), "corrupt blob discarded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_task_stops_on_cancel() {
        let endpoint = Arc::new(MockTokenEndpoint::new());
        endpoint.push_refresh(Ok(token_response("a1", None, 3600)));
        let installation = installation(
            endpoint.clone(),
            Arc::new(MemoryBlobStorage::new()),
            Arc::new(MockTransport::new()),
        );
        installation
            .manager()
            .install(token_set_expiring_in("a0", "r0", 30))
            .await
            .expect("install");

        let cancel = CancellationToken::new();
        let handle = installation.spawn_refresh_task(cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(endpoint.refresh_calls(), 1, "token inside the margin is refreshed");
        assert_eq!(installation.state(), LifecycleState::Valid);

        cancel.cancel();
        handle.await.expect("task exits cleanly");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.rate_limit_capacity = 0;
        let result = Installation::with_adapters(
            config,
            Arc::new(MockTokenEndpoint::new()),
            Arc::new(MemoryBlobStorage::new()),
            Arc::new(MockTransport::new()),
        );
        assert!(matches!(result, Err(tokenlink_core::OAuthError::Config(_))));
    }
}
