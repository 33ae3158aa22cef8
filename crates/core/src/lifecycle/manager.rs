//! Token lifecycle manager
//!
//! Owns the installation's [`TokenSet`] and its derived state:
//!
//! ```text
//!            refresh ok                 invalid_grant / 401 / corrupt store
//!   Valid ◄──────────── Refreshing ─────────────────────────► ReauthRequired
//!     │                    ▲                                        │
//!     └── within margin ─► Expired                       install() ─┘
//! ```
//!
//! At most one refresh is in flight per installation. The refresh runs on
//! its own task and is shared through a `futures::future::Shared`; callers
//! that arrive while it runs await the same result. Dropping a caller never
//! cancels the refresh.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::RwLock;
use tokenlink_common::auth::redact_token;
use tokenlink_domain::constants::{DEFAULT_REFRESH_MARGIN, DEFAULT_REQUEST_TIMEOUT};
use tokenlink_domain::{LifecycleState, LinkConfig, ReauthEvent, ReauthReason, TokenSet};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{OAuthError, OAuthResult};
use crate::ports::{ReauthObserver, TokenEndpoint};
use crate::store::TokenStore;

type RefreshFuture = Shared<BoxFuture<'static, OAuthResult<TokenSet>>>;

/// Tunables of the lifecycle manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// A token expiring within this margin no longer counts as valid
    pub refresh_margin: Duration,
    /// Upper bound on one refresh request
    pub request_timeout: Duration,
    /// Scopes the installation was authorized for
    pub scopes: Vec<String>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            scopes: Vec::new(),
        }
    }
}

impl LifecycleSettings {
    #[must_use]
    pub fn from_config(config: &LinkConfig) -> Self {
        Self {
            refresh_margin: config.refresh_margin,
            request_timeout: config.request_timeout,
            scopes: config.scopes.clone(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    tokens: Option<TokenSet>,
    refreshing: bool,
    reauth: Option<ReauthEvent>,
}

enum Plan {
    Reuse(TokenSet),
    Refresh(String),
}

/// What a caller wants from the single-flight guard
enum Trigger<'a> {
    /// Refresh only if the token is inside the margin
    IfStale,
    /// Always refresh
    Force,
    /// Refresh unless the access token already differs from this one
    IfCurrent(&'a str),
}

struct ManagerCore {
    endpoint: Arc<dyn TokenEndpoint>,
    store: Arc<TokenStore>,
    settings: LifecycleSettings,
    inner: RwLock<Inner>,
    in_flight: Mutex<Option<RefreshFuture>>,
    observers: RwLock<Vec<Arc<dyn ReauthObserver>>>,
    changes: watch::Sender<u64>,
}

/// Cheaply cloneable handle to the installation's token lifecycle.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    core: Arc<ManagerCore>,
}

impl TokenLifecycleManager {
    pub fn new(
        endpoint: Arc<dyn TokenEndpoint>,
        store: Arc<TokenStore>,
        settings: LifecycleSettings,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            core: Arc::new(ManagerCore {
                endpoint,
                store,
                settings,
                inner: RwLock::new(Inner { tokens: None, refreshing: false, reauth: None }),
                in_flight: Mutex::new(None),
                observers: RwLock::new(Vec::new()),
                changes,
            }),
        }
    }

    /// Register a callback for `ReauthRequired` transitions
    pub fn subscribe(&self, observer: Arc<dyn ReauthObserver>) {
        self.core.observers.write().push(observer);
    }

    /// Receiver bumped whenever the token set or state changes
    pub fn watch_changes(&self) -> watch::Receiver<u64> {
        self.core.changes.subscribe()
    }

    /// Current derived state
    pub fn state(&self) -> LifecycleState {
        let inner = self.core.inner.read();
        if inner.refreshing {
            return LifecycleState::Refreshing;
        }
        match &inner.tokens {
            None => LifecycleState::ReauthRequired,
            Some(tokens) if tokens.expires_within(self.core.settings.refresh_margin, Utc::now()) => {
                LifecycleState::Expired
            }
            Some(_) => LifecycleState::Valid,
        }
    }

    /// Last reauthorization event, kept until new tokens are installed
    pub fn reauth_event(&self) -> Option<ReauthEvent> {
        self.core.inner.read().reauth.clone()
    }

    /// Expiry of the current token set
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.core.inner.read().tokens.as_ref().map(|t| t.expires_at)
    }

    /// Copy of the current token set
    pub fn token_set(&self) -> Option<TokenSet> {
        self.core.inner.read().tokens.clone()
    }

    /// Configured refresh margin
    pub fn refresh_margin(&self) -> Duration {
        self.core.settings.refresh_margin
    }

    /// Access token valid beyond the safety margin, refreshing if needed.
    ///
    /// Concurrent callers during a refresh share its result.
    ///
    /// # Errors
    /// - `ReauthRequired` / `NotAuthorized` when no usable grant exists
    /// - the refresh failure, identical for every waiting caller
    pub async fn get_valid_token(&self) -> OAuthResult<String> {
        {
            let inner = self.core.inner.read();
            if let Some(tokens) = &inner.tokens {
                if !tokens.expires_within(self.core.settings.refresh_margin, Utc::now()) {
                    return Ok(tokens.access_token.clone());
                }
            }
        }
        self.single_flight(Trigger::IfStale).await.map(|t| t.access_token)
    }

    /// Force a refresh, joining one already in flight.
    ///
    /// # Errors
    /// Same as [`get_valid_token`](Self::get_valid_token).
    pub async fn refresh(&self) -> OAuthResult<TokenSet> {
        self.single_flight(Trigger::Force).await
    }

    /// Refresh because `rejected_access_token` was refused by a resource.
    ///
    /// If the current access token already differs, another caller has
    /// refreshed and the current set is returned without a new request.
    ///
    /// # Errors
    /// Same as [`get_valid_token`](Self::get_valid_token).
    pub async fn refresh_if_current(&self, rejected_access_token: &str) -> OAuthResult<TokenSet> {
        self.single_flight(Trigger::IfCurrent(rejected_access_token)).await
    }

    async fn single_flight(&self, trigger: Trigger<'_>) -> OAuthResult<TokenSet> {
        let pending = {
            let mut slot = self.core.in_flight.lock().await;
            if let Some(pending) = slot.as_ref() {
                debug!("Joining in-flight refresh");
                pending.clone()
            } else {
                match self.plan(&trigger)? {
                    Plan::Reuse(current) => return Ok(current),
                    Plan::Refresh(refresh_token) => {
                        let pending = self.spawn_refresh(refresh_token);
                        *slot = Some(pending.clone());
                        pending
                    }
                }
            }
        };
        pending.await
    }

    /// Decided under the single-flight guard, so the token cannot change
    /// between the check and the start of the refresh.
    fn plan(&self, trigger: &Trigger<'_>) -> OAuthResult<Plan> {
        let inner = self.core.inner.read();
        let Some(tokens) = inner.tokens.as_ref() else {
            return Err(match &inner.reauth {
                Some(event) => OAuthError::ReauthRequired(event.reason),
                None => OAuthError::NotAuthorized,
            });
        };
        let reuse = match trigger {
            Trigger::IfStale => {
                !tokens.expires_within(self.core.settings.refresh_margin, Utc::now())
            }
            Trigger::Force => false,
            Trigger::IfCurrent(rejected) => tokens.access_token != *rejected,
        };
        Ok(if reuse {
            Plan::Reuse(tokens.clone())
        } else {
            Plan::Refresh(tokens.refresh_token.clone())
        })
    }

    /// Wait until no refresh is in flight and hold the guard so none starts.
    async fn quiesce(&self) -> MutexGuard<'_, Option<RefreshFuture>> {
        loop {
            let slot = self.core.in_flight.lock().await;
            let Some(pending) = slot.as_ref().cloned() else {
                return slot;
            };
            // The refresh task clears the slot itself before resolving
            drop(slot);
            let _ = pending.await;
        }
    }

    fn spawn_refresh(&self, refresh_token: String) -> RefreshFuture {
        let core = Arc::clone(&self.core);
        core.inner.write().refreshing = true;
        core.notify();

        let task = tokio::spawn(async move {
            let result = core.perform_refresh(&refresh_token).await;
            core.inner.write().refreshing = false;
            core.notify();
            // Late arrivals from here on see the new state instead of this result
            *core.in_flight.lock().await = None;
            result
        });

        async move {
            task.await.unwrap_or_else(|e| Err(OAuthError::Internal(format!("refresh task: {e}"))))
        }
        .boxed()
        .shared()
    }

    /// Install a freshly authorized token set, leaving `ReauthRequired`.
    ///
    /// Waits for an in-flight refresh so its result cannot overwrite the new
    /// set.
    ///
    /// # Errors
    /// Returns the persistence error; the set is not installed in that case.
    #[instrument(skip_all)]
    pub async fn install(&self, tokens: TokenSet) -> OAuthResult<()> {
        tokens.validate().map_err(|e| OAuthError::protocol(e.to_string()))?;
        let slot = self.quiesce().await;
        self.core.store.persist(&tokens).await?;
        {
            let mut inner = self.core.inner.write();
            inner.tokens = Some(tokens);
            inner.reauth = None;
        }
        drop(slot);
        self.core.notify();
        info!("Token set installed");
        Ok(())
    }

    /// Load the persisted token set at startup.
    ///
    /// Returns whether a set was restored. A corrupt blob is discarded and
    /// the manager enters `ReauthRequired` with `StoreCorrupted`.
    ///
    /// # Errors
    /// Returns storage errors other than corruption.
    #[instrument(skip_all)]
    pub async fn restore(&self) -> OAuthResult<bool> {
        match self.core.store.load_persisted().await {
            Ok(Some(tokens)) => {
                info!(expires_at = %tokens.expires_at, "Restored persisted token set");
                self.core.inner.write().tokens = Some(tokens);
                self.core.notify();
                Ok(true)
            }
            Ok(None) => {
                info!("No persisted token set; authorization required");
                Ok(false)
            }
            Err(OAuthError::CorruptStore(message)) => {
                error!(error = %message, "Persisted token set is corrupt, discarding");
                self.core
                    .enter_reauth(ReauthReason::StoreCorrupted, format!("corrupt store: {message}"))
                    .await;
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Revoke the grant (best effort) and destroy all local token material.
    ///
    /// # Errors
    /// Returns the error of deleting the persisted blob.
    #[instrument(skip_all)]
    pub async fn revoke(&self) -> OAuthResult<()> {
        let slot = self.quiesce().await;
        let tokens = {
            let mut inner = self.core.inner.write();
            inner.reauth = None;
            inner.tokens.take()
        };
        drop(slot);

        if let Some(tokens) = tokens {
            if self.core.endpoint.supports_revocation() {
                match self.core.endpoint.revoke(&tokens.refresh_token).await {
                    Ok(()) => info!("Refresh token revoked"),
                    Err(err) => warn!(error = %err, "Token revocation failed; destroying locally"),
                }
            } else {
                debug!("No revocation endpoint configured, skipping remote revocation");
            }
        }

        let result = self.core.store.destroy().await;
        self.core.notify();
        result
    }
}

impl ManagerCore {
    fn notify(&self) {
        self.changes.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    #[instrument(skip_all)]
    async fn perform_refresh(&self, refresh_token: &str) -> OAuthResult<TokenSet> {
        debug!(refresh_token = %redact_token(refresh_token), "Refreshing token set");
        let response =
            match tokio::time::timeout(self.settings.request_timeout, self.endpoint.refresh(refresh_token))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(OAuthError::transient(format!(
                    "token refresh timed out after {:?}",
                    self.settings.request_timeout
                ))),
            };

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                if let Some(reason) = err.reauth_reason() {
                    self.enter_reauth(reason, err.to_string()).await;
                } else {
                    warn!(error = %err, "Token refresh failed");
                }
                return Err(err);
            }
        };

        let tokens = TokenSet::from_response(response, Some(refresh_token), Utc::now())
            .map_err(|e| OAuthError::protocol(e.to_string()))?;
        if tokens.refresh_token != refresh_token {
            debug!("Refresh token rotated");
        }
        self.warn_on_scope_drift(&tokens);

        self.inner.write().tokens = Some(tokens.clone());
        if let Err(err) = self.store.persist(&tokens).await {
            error!(error = %err, "Failed to persist refreshed token set");
        }
        info!(expires_at = %tokens.expires_at, "Token set refreshed");
        Ok(tokens)
    }

    fn warn_on_scope_drift(&self, tokens: &TokenSet) {
        if tokens.scope.is_none() {
            return;
        }
        let granted: Vec<&str> = tokens.scopes().collect();
        let missing: Vec<&str> = self
            .settings
            .scopes
            .iter()
            .map(String::as_str)
            .filter(|s| !granted.contains(s))
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "Refreshed token lacks configured scopes");
        }
    }

    async fn enter_reauth(&self, reason: ReauthReason, message: String) {
        let event = ReauthEvent::new(reason, message);
        {
            let mut inner = self.inner.write();
            inner.tokens = None;
            inner.reauth = Some(event.clone());
        }
        warn!(reason = %reason, "Reauthorization required");

        if let Err(err) = self.store.destroy().await {
            error!(error = %err, "Failed to delete persisted token set");
        }
        self.notify();

        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_reauth_required(&event);
        }
    }
}
