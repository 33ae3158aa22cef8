//! Shared helpers for infra integration tests

// Each test binary uses a subset of these helpers
#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tokenlink_domain::{Endpoints, LinkConfig, RetrySettings};
use wiremock::MockServer;

pub const REDIRECT_URI: &str = "https://example.com/callback";

pub fn endpoints(server: &MockServer) -> Endpoints {
    Endpoints {
        authorization_url: format!("{}/ap/oa", server.uri()),
        token_url: format!("{}/auth/o2/token", server.uri()),
        revocation_url: Some(format!("{}/auth/o2/revoke", server.uri())),
    }
}

/// Configuration pointing at `server`, storing tokens under `store_dir`.
pub fn config(server: &MockServer, store_dir: &Path) -> LinkConfig {
    let mut config = LinkConfig::new("client-id", "client-secret", REDIRECT_URI, "install-key");
    config.endpoints = Some(endpoints(server));
    config.store_path = store_dir.join("tokens.json");
    config.request_timeout = Duration::from_secs(2);
    config.retry_policy = RetrySettings {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..RetrySettings::default()
    };
    config
}

pub fn token_json(access: &str, refresh: Option<&str>, expires_in: i64) -> Value {
    let mut body = json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": expires_in,
        "scope": "smart_home",
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = json!(refresh);
    }
    body
}

/// `state` query parameter of an authorization URL
pub fn state_param(authorization_url: &str) -> String {
    url::Url::parse(authorization_url)
        .expect("authorization url")
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state parameter")
}
