//! In-memory test doubles for the core ports
//!
//! Available to this crate's tests and, with the `test-utils` feature, to
//! downstream crates.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;
use tokenlink_domain::{ApiRequest, ApiResponse, ReauthEvent, ReauthReason, TokenResponse, TokenSet};

use crate::error::{OAuthError, OAuthResult};
use crate::lifecycle::{LifecycleSettings, TokenLifecycleManager};
use crate::ports::{BlobStorage, ReauthObserver, ResourceTransport, TokenEndpoint};
use crate::store::TokenStore;

/// Successful token endpoint response
pub fn token_response(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        token_type: "Bearer".to_string(),
        expires_in,
        scope: None,
    }
}

/// Token set issued an hour ago and expiring in `secs` seconds
pub fn token_set_expiring_in(access: &str, refresh: &str, secs: i64) -> TokenSet {
    let now = Utc::now();
    TokenSet {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        token_type: "Bearer".to_string(),
        scope: None,
        issued_at: now - TimeDelta::hours(1),
        expires_at: now + TimeDelta::seconds(secs),
    }
}

/// Manager over in-memory storage with default settings
pub fn manager_with(endpoint: Arc<MockTokenEndpoint>) -> (TokenLifecycleManager, Arc<TokenStore>) {
    let storage: Arc<dyn BlobStorage> = Arc::new(MemoryBlobStorage::new());
    let store = Arc::new(TokenStore::new("test-installation-secret", storage));
    let manager =
        TokenLifecycleManager::new(endpoint, Arc::clone(&store), LifecycleSettings::default());
    (manager, store)
}

/// Scripted token endpoint.
///
/// Queued results are returned in order; an empty refresh queue yields a
/// fresh `access-N` token valid for one hour.
#[derive(Default)]
pub struct MockTokenEndpoint {
    exchange_queue: Mutex<VecDeque<OAuthResult<TokenResponse>>>,
    refresh_queue: Mutex<VecDeque<OAuthResult<TokenResponse>>>,
    revoke_queue: Mutex<VecDeque<OAuthResult<()>>>,
    exchange_calls: AtomicU32,
    refresh_calls: AtomicU32,
    verifiers: Mutex<Vec<String>>,
    refresh_tokens: Mutex<Vec<String>>,
    revoked: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
    without_revocation: bool,
}

impl MockTokenEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint reporting no revocation support
    pub fn without_revocation() -> Self {
        Self { without_revocation: true, ..Self::default() }
    }

    pub fn push_exchange(&self, result: OAuthResult<TokenResponse>) {
        self.exchange_queue.lock().push_back(result);
    }

    pub fn push_refresh(&self, result: OAuthResult<TokenResponse>) {
        self.refresh_queue.lock().push_back(result);
    }

    pub fn push_revoke(&self, result: OAuthResult<()>) {
        self.revoke_queue.lock().push_back(result);
    }

    /// Delay applied before every exchange and refresh response
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn exchange_calls(&self) -> u32 {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Code verifiers received by `exchange_code`
    pub fn exchanged_verifiers(&self) -> Vec<String> {
        self.verifiers.lock().clone()
    }

    /// Refresh tokens received by `refresh`
    pub fn refreshed_with(&self) -> Vec<String> {
        self.refresh_tokens.lock().clone()
    }

    /// Tokens received by `revoke`
    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TokenEndpoint for MockTokenEndpoint {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        _redirect_uri: &str,
    ) -> OAuthResult<TokenResponse> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.verifiers.lock().push(code_verifier.to_string());
        self.pause().await;
        let next = self.exchange_queue.lock().pop_front();
        next.unwrap_or_else(|| Ok(token_response(&format!("access-{code}"), Some("refresh"), 3600)))
    }

    async fn refresh(&self, refresh_token: &str) -> OAuthResult<TokenResponse> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresh_tokens.lock().push(refresh_token.to_string());
        self.pause().await;
        let next = self.refresh_queue.lock().pop_front();
        next.unwrap_or_else(|| Ok(token_response(&format!("access-{n}"), None, 3600)))
    }

    async fn revoke(&self, token: &str) -> OAuthResult<()> {
        self.revoked.lock().push(token.to_string());
        let next = self.revoke_queue.lock().pop_front();
        next.unwrap_or(Ok(()))
    }

    fn supports_revocation(&self) -> bool {
        !self.without_revocation
    }
}

/// Blob storage held in memory
#[derive(Default)]
pub struct MemoryBlobStorage {
    contents: Mutex<Option<Vec<u8>>>,
    writes: AtomicU32,
    fail_writes: Mutex<bool>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents.lock().clone()
    }

    pub fn set_contents(&self, bytes: Vec<u8>) {
        *self.contents.lock() = Some(bytes);
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn read(&self) -> OAuthResult<Option<Vec<u8>>> {
        Ok(self.contents())
    }

    async fn write(&self, bytes: &[u8]) -> OAuthResult<()> {
        if *self.fail_writes.lock() {
            return Err(OAuthError::storage("write rejected"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.contents.lock() = Some(bytes.to_vec());
        Ok(())
    }

    async fn delete(&self) -> OAuthResult<()> {
        *self.contents.lock() = None;
        Ok(())
    }
}

/// Observer recording every reauthorization event
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ReauthEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReauthEvent> {
        self.events.lock().clone()
    }

    pub fn reasons(&self) -> Vec<ReauthReason> {
        self.events.lock().iter().map(|e| e.reason).collect()
    }
}

impl ReauthObserver for RecordingObserver {
    fn on_reauth_required(&self, event: &ReauthEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Scripted resource transport; an empty queue answers `200 {}`
#[derive(Default)]
pub struct MockTransport {
    queue: Mutex<VecDeque<OAuthResult<ApiResponse>>>,
    bearers: Mutex<Vec<String>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: OAuthResult<ApiResponse>) {
        self.queue.lock().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.bearers.lock().len()
    }

    pub fn bearers(&self) -> Vec<String> {
        self.bearers.lock().clone()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ResourceTransport for MockTransport {
    async fn send(&self, request: &ApiRequest, bearer: &str) -> OAuthResult<ApiResponse> {
        self.bearers.lock().push(bearer.to_string());
        self.requests.lock().push(request.clone());
        let next = self.queue.lock().pop_front();
        next.unwrap_or_else(|| Ok(ApiResponse::new(200, b"{}".to_vec())))
    }
}
