//! Integration tests for the authorization flow feeding the lifecycle manager.

use std::collections::HashMap;
use std::sync::Arc;

use tokenlink_core::testing::{
    manager_with, token_response, token_set_expiring_in, MockTokenEndpoint, RecordingObserver,
};
use tokenlink_core::{
    AuthorizationFlowEngine, OAuthError, ReauthObserver, RefreshScheduler, TokenEndpoint,
};
use tokenlink_common::RetryPolicy;
use tokenlink_domain::{CallbackParams, FlowStatus, LifecycleState, ReauthReason};
use url::Url;

const AUTHORIZE: &str = "https://auth.example.com/ap/oa";
const REDIRECT: &str = "https://host.example.com/callback";

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url).expect("url").query_pairs().into_owned().collect()
}

/// Validates the forged-callback scenario end to end.
///
/// Assertions:
/// - The authorization URL requests S256.
/// - A state mismatch is a protocol error and leaves no pending flow.
/// - A second completion reports the flow as not found.
#[tokio::test]
async fn forged_state_is_rejected_and_flow_is_single_use() {
    let endpoint = Arc::new(MockTokenEndpoint::new());
    let engine =
        AuthorizationFlowEngine::new(AUTHORIZE, Arc::clone(&endpoint) as Arc<dyn TokenEndpoint>);

    let request = engine.begin(["read"], "client", REDIRECT).expect("begin");
    assert!(request.url.contains("code_challenge_method=S256"));

    let forged = CallbackParams::from_url(&format!("{REDIRECT}?code=c&state=forged")).expect("url");
    let err = engine.complete(request.flow_id, &forged).await.expect_err("forged");
    assert!(matches!(err, OAuthError::Protocol { .. }));
    assert_eq!(engine.pending_flows(), 0);

    let genuine_state = query(&request.url)["state"].clone();
    let genuine = CallbackParams::success("c", genuine_state);
    let again = engine.complete(request.flow_id, &genuine).await.expect_err("consumed");
    assert_eq!(again, OAuthError::FlowNotFound(request.flow_id));
    assert_eq!(endpoint.exchange_calls(), 0);
}

/// Validates authorization → install → proactive and reactive refresh.
///
/// Assertions:
/// - Tokens from `complete` can be installed and used.
/// - A token 30 s from expiry (60 s margin) is refreshed before use.
#[tokio::test]
async fn authorized_tokens_are_refreshed_before_use() {
    let endpoint = Arc::new(MockTokenEndpoint::new());
    endpoint.push_exchange(Ok(token_response("first", Some("r-first"), 30)));
    endpoint.push_refresh(Ok(token_response("second", Some("r-second"), 3600)));

    let engine =
        AuthorizationFlowEngine::new(AUTHORIZE, Arc::clone(&endpoint) as Arc<dyn TokenEndpoint>);
    let (manager, store) = manager_with(Arc::clone(&endpoint));

    let request = engine.begin(["smart_home"], "client", REDIRECT).expect("begin");
    let state = query(&request.url)["state"].clone();
    let tokens = engine
        .complete(request.flow_id, &CallbackParams::success("code", state))
        .await
        .expect("complete");
    assert_eq!(engine.status(request.flow_id), Some(FlowStatus::Complete));

    manager.install(tokens).await.expect("install");
    assert_eq!(manager.state(), LifecycleState::Expired);

    assert_eq!(manager.get_valid_token().await.expect("token"), "second");
    assert_eq!(endpoint.refreshed_with(), vec!["r-first".to_string()]);
    let persisted = store.load_persisted().await.expect("load").expect("present");
    assert_eq!(persisted.refresh_token, "r-second");
}

#[tokio::test]
async fn reauth_is_persistent_until_new_authorization() {
    let endpoint = Arc::new(MockTokenEndpoint::new());
    endpoint.push_refresh(Err(OAuthError::authentication(
        ReauthReason::ClientSecretRotated,
        "invalid_client",
    )));
    let (manager, _) = manager_with(Arc::clone(&endpoint));
    let observer = Arc::new(RecordingObserver::new());
    manager.subscribe(Arc::clone(&observer) as Arc<dyn ReauthObserver>);
    manager.install(token_set_expiring_in("a0", "r0", 10)).await.expect("install");

    let scheduler = RefreshScheduler::new(manager.clone(), RetryPolicy::no_retry(), Default::default());
    assert!(scheduler.tick().await.is_err());

    for _ in 0..3 {
        assert_eq!(
            manager.get_valid_token().await,
            Err(OAuthError::ReauthRequired(ReauthReason::ClientSecretRotated))
        );
    }
    assert_eq!(observer.events().len(), 1);
    assert_eq!(endpoint.refresh_calls(), 1);
    assert_eq!(scheduler.time_until_next_refresh(), None);

    manager.install(token_set_expiring_in("fresh", "r1", 3600)).await.expect("install");
    assert_eq!(manager.state(), LifecycleState::Valid);
    assert_eq!(manager.reauth_event(), None);
}
