//! Integration tests for the configuration loader
//!
//! Loads complete files from disk and checks every recognised option.

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokenlink_domain::{DomainError, Region};
use tokenlink_infra::config;

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write config file");
    path
}

#[test]
fn test_load_config_from_toml_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(
        &dir,
        "tokenlink.toml",
        r#"
client_id = "amzn1.application-oa2-client.abc"
client_secret = "secret"
scopes = ["smart_home", "profile"]
redirect_uri = "https://example.com/callback"
region = "eu"
update_interval = 120
rate_limit_capacity = 5
rate_limit_refill_rate = 2.5
refresh_margin = 90
refresh_jitter = 0
request_timeout = 10
flow_ttl = 300
store_path = "/var/lib/tokenlink/tokens.json"
installation_secret = "installation"

[retry_policy]
max_attempts = 4
initial_delay = 0.5
max_delay = 20
multiplier = 3.0
jitter_fraction = 0.1

[logging]
level = "tokenlink=debug"
json = true
"#,
    );

    let config = config::load_from_file(Some(path)).expect("valid TOML config");

    assert_eq!(config.scopes, vec!["smart_home".to_string(), "profile".to_string()]);
    assert_eq!(config.region, Region::Europe);
    assert_eq!(config.endpoints().token_url, "https://api.amazon.co.uk/auth/o2/token");
    assert_eq!(config.update_interval, Duration::from_secs(120));
    assert_eq!(config.rate_limit().capacity, 5);
    assert_eq!(config.retry_policy.max_attempts, 4);
    assert_eq!(config.retry_policy.initial_delay, Duration::from_millis(500));
    assert_eq!(config.refresh_jitter, Duration::ZERO);
    assert_eq!(config.flow_ttl, Duration::from_secs(300));
    assert_eq!(config.store_path, PathBuf::from("/var/lib/tokenlink/tokens.json"));
    assert!(config.logging.json);
}

#[test]
fn test_load_config_with_minimal_fields() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(
        &dir,
        "config.json",
        r#"{
            "client_id": "client",
            "client_secret": "secret",
            "redirect_uri": "http://127.0.0.1:8080/cb",
            "installation_secret": "installation"
        }"#,
    );

    let config = config::load_from_file(Some(path)).expect("minimal JSON config");

    assert_eq!(config.region, Region::NorthAmerica);
    assert_eq!(config.scopes, vec!["smart_home".to_string()]);
    assert_eq!(config.refresh_margin, Duration::from_secs(60));
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert_eq!(config.endpoints, None);
}

#[test]
fn test_load_config_from_nonexistent_file() {
    let result = config::load_from_file(Some("/nonexistent/path/tokenlink.json".into()));

    match result {
        Err(DomainError::Config(msg)) => assert!(msg.contains("not found"), "{msg}"),
        other => panic!("Expected Config error, got {other:?}"),
    }
}

#[test]
fn test_load_config_with_invalid_format() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "tokenlink.json", r#"{ "this is": "not valid" "#);

    match config::load_from_file(Some(path)) {
        Err(DomainError::Config(msg)) => assert!(msg.contains("Invalid JSON"), "{msg}"),
        other => panic!("Expected Config error, got {other:?}"),
    }
}

#[test]
fn test_load_config_fails_validation() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(
        &dir,
        "tokenlink.toml",
        r#"
client_id = "client"
client_secret = "secret"
redirect_uri = "https://example.com/cb"
installation_secret = "installation"
rate_limit_refill_rate = 0
"#,
    );

    match config::load_from_file(Some(path)) {
        Err(DomainError::Config(msg)) => assert!(msg.contains("rate_limit_refill_rate"), "{msg}"),
        other => panic!("Expected Config error, got {other:?}"),
    }
}
