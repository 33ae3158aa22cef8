//! Typed installation configuration
//!
//! Every recognised option is a field here; unknown keys are rejected at
//! deserialization. Durations are written as (fractional) seconds.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    DEFAULT_FLOW_TTL, DEFAULT_RATE_LIMIT_CAPACITY, DEFAULT_RATE_LIMIT_REFILL_RATE,
    DEFAULT_REFRESH_JITTER, DEFAULT_REFRESH_MARGIN, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_RETRY_INITIAL_DELAY, DEFAULT_RETRY_JITTER, DEFAULT_RETRY_MAX_ATTEMPTS,
    DEFAULT_RETRY_MAX_DELAY, DEFAULT_RETRY_MULTIPLIER, DEFAULT_SCOPE, DEFAULT_STORE_PATH,
    DEFAULT_UPDATE_INTERVAL, EU_AUTHORIZATION_URL, EU_REVOCATION_URL, EU_TOKEN_URL,
    FE_AUTHORIZATION_URL, FE_REVOCATION_URL, FE_TOKEN_URL, NA_AUTHORIZATION_URL,
    NA_REVOCATION_URL, NA_TOKEN_URL,
};
use crate::{impl_status_strings, DomainError, Result};

/// Login with Amazon region
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[default]
    #[serde(rename = "na")]
    NorthAmerica,
    #[serde(rename = "eu")]
    Europe,
    #[serde(rename = "fe")]
    FarEast,
}

impl_status_strings!(Region {
    NorthAmerica => "na",
    Europe => "eu",
    FarEast => "fe",
});

impl Region {
    /// Endpoint preset for this region.
    #[must_use]
    pub fn endpoints(&self) -> Endpoints {
        let (authorization_url, token_url, revocation_url) = match self {
            Self::NorthAmerica => (NA_AUTHORIZATION_URL, NA_TOKEN_URL, NA_REVOCATION_URL),
            Self::Europe => (EU_AUTHORIZATION_URL, EU_TOKEN_URL, EU_REVOCATION_URL),
            Self::FarEast => (FE_AUTHORIZATION_URL, FE_TOKEN_URL, FE_REVOCATION_URL),
        };
        Endpoints {
            authorization_url: authorization_url.to_string(),
            token_url: token_url.to_string(),
            revocation_url: Some(revocation_url.to_string()),
        }
    }
}

/// Authorization server endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoints {
    pub authorization_url: String,
    pub token_url: String,
    #[serde(default)]
    pub revocation_url: Option<String>,
}

impl Endpoints {
    fn validate(&self) -> Result<()> {
        require_http_url("endpoints.authorization_url", &self.authorization_url)?;
        require_http_url("endpoints.token_url", &self.token_url)?;
        if let Some(revocation_url) = &self.revocation_url {
            require_http_url("endpoints.revocation_url", revocation_url)?;
        }
        Ok(())
    }
}

/// Backoff settings for gateway calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_fraction: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            jitter_fraction: DEFAULT_RETRY_JITTER,
        }
    }
}

/// Token bucket settings, derived from the flat config fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSettings {
    pub capacity: u32,
    pub refill_rate: f64,
}

/// Tracing bootstrap settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

fn default_scopes() -> Vec<String> {
    vec![DEFAULT_SCOPE.to_string()]
}

fn default_update_interval() -> Duration {
    DEFAULT_UPDATE_INTERVAL
}

fn default_capacity() -> u32 {
    DEFAULT_RATE_LIMIT_CAPACITY
}

fn default_refill_rate() -> f64 {
    DEFAULT_RATE_LIMIT_REFILL_RATE
}

fn default_refresh_margin() -> Duration {
    DEFAULT_REFRESH_MARGIN
}

fn default_refresh_jitter() -> Duration {
    DEFAULT_REFRESH_JITTER
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_flow_ttl() -> Duration {
    DEFAULT_FLOW_TTL
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

/// Configuration of one installation
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    #[serde(default)]
    pub region: Region,
    /// Overrides the region preset
    #[serde(default)]
    pub endpoints: Option<Endpoints>,
    /// Poll cadence for the external coordinator
    #[serde(default = "default_update_interval", with = "duration_secs")]
    pub update_interval: Duration,
    #[serde(default = "default_capacity")]
    pub rate_limit_capacity: u32,
    #[serde(default = "default_refill_rate")]
    pub rate_limit_refill_rate: f64,
    #[serde(default)]
    pub retry_policy: RetrySettings,
    #[serde(default = "default_refresh_margin", with = "duration_secs")]
    pub refresh_margin: Duration,
    #[serde(default = "default_refresh_jitter", with = "duration_secs")]
    pub refresh_jitter: Duration,
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,
    #[serde(default = "default_flow_ttl", with = "duration_secs")]
    pub flow_ttl: Duration,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    pub installation_secret: String,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl fmt::Debug for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri)
            .field("region", &self.region)
            .field("endpoints", &self.endpoints)
            .field("update_interval", &self.update_interval)
            .field("rate_limit_capacity", &self.rate_limit_capacity)
            .field("rate_limit_refill_rate", &self.rate_limit_refill_rate)
            .field("retry_policy", &self.retry_policy)
            .field("refresh_margin", &self.refresh_margin)
            .field("refresh_jitter", &self.refresh_jitter)
            .field("request_timeout", &self.request_timeout)
            .field("flow_ttl", &self.flow_ttl)
            .field("store_path", &self.store_path)
            .field("installation_secret", &"[REDACTED]")
            .field("logging", &self.logging)
            .finish()
    }
}

impl LinkConfig {
    /// Configuration with every optional field at its default.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        installation_secret: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: default_scopes(),
            redirect_uri: redirect_uri.into(),
            region: Region::default(),
            endpoints: None,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            rate_limit_capacity: DEFAULT_RATE_LIMIT_CAPACITY,
            rate_limit_refill_rate: DEFAULT_RATE_LIMIT_REFILL_RATE,
            retry_policy: RetrySettings::default(),
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            refresh_jitter: DEFAULT_REFRESH_JITTER,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            flow_ttl: DEFAULT_FLOW_TTL,
            store_path: default_store_path(),
            installation_secret: installation_secret.into(),
            logging: LoggingSettings::default(),
        }
    }

    /// Effective endpoints: the explicit override, else the region preset.
    #[must_use]
    pub fn endpoints(&self) -> Endpoints {
        self.endpoints.clone().unwrap_or_else(|| self.region.endpoints())
    }

    #[must_use]
    pub const fn rate_limit(&self) -> RateLimitSettings {
        RateLimitSettings {
            capacity: self.rate_limit_capacity,
            refill_rate: self.rate_limit_refill_rate,
        }
    }

    /// Validate all fields.
    ///
    /// # Errors
    /// Returns `DomainError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(config_error("client_id", "must not be empty"));
        }
        if self.client_secret.is_empty() {
            return Err(config_error("client_secret", "must not be empty"));
        }
        if self.installation_secret.is_empty() {
            return Err(config_error("installation_secret", "must not be empty"));
        }
        if self.scopes.iter().any(|s| s.is_empty() || s.contains(char::is_whitespace)) {
            return Err(config_error("scopes", "entries must be non-empty and without spaces"));
        }
        require_http_url("redirect_uri", &self.redirect_uri)?;
        if let Some(endpoints) = &self.endpoints {
            endpoints.validate()?;
        }

        if self.rate_limit_capacity == 0 {
            return Err(config_error("rate_limit_capacity", "must be greater than 0"));
        }
        if !(self.rate_limit_refill_rate.is_finite() && self.rate_limit_refill_rate > 0.0) {
            return Err(config_error("rate_limit_refill_rate", "must be a positive number"));
        }

        let retry = &self.retry_policy;
        if retry.max_attempts == 0 {
            return Err(config_error("retry_policy.max_attempts", "must be greater than 0"));
        }
        if !(retry.multiplier.is_finite() && retry.multiplier >= 1.0) {
            return Err(config_error("retry_policy.multiplier", "must be at least 1.0"));
        }
        if !(0.0..1.0).contains(&retry.jitter_fraction) {
            return Err(config_error("retry_policy.jitter_fraction", "must be in [0, 1)"));
        }
        if retry.initial_delay > retry.max_delay {
            return Err(config_error("retry_policy.initial_delay", "must not exceed max_delay"));
        }

        if self.request_timeout.is_zero() {
            return Err(config_error("request_timeout", "must be greater than zero"));
        }
        if self.flow_ttl.is_zero() {
            return Err(config_error("flow_ttl", "must be greater than zero"));
        }
        if self.update_interval.is_zero() {
            return Err(config_error("update_interval", "must be greater than zero"));
        }
        Ok(())
    }
}

fn config_error(field: &str, message: &str) -> DomainError {
    DomainError::Config(format!("{field}: {message}"))
}

fn require_http_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).map_err(|e| config_error(field, &format!("invalid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(config_error(field, &format!("unsupported scheme: {other}"))),
    }
}

/// Serde helper storing a `Duration` as seconds (`f64`)
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> LinkConfig {
        LinkConfig::new("amzn1.client", "s3cret", "https://example.com/callback", "install-key")
    }

    #[test]
    fn test_defaults() {
        let config = valid();
        config.validate().expect("valid");
        assert_eq!(config.scopes, vec!["smart_home".to_string()]);
        assert_eq!(config.rate_limit().capacity, 20);
        assert_eq!(config.retry_policy.max_attempts, 3);
        assert_eq!(config.endpoints().token_url, NA_TOKEN_URL);
    }

    #[test]
    fn test_region_and_override() {
        let mut config = valid();
        config.region = Region::FarEast;
        assert_eq!(config.endpoints().token_url, "https://api.amazon.co.jp/auth/o2/token");

        config.endpoints = Some(Endpoints {
            authorization_url: "http://127.0.0.1:9000/authorize".to_string(),
            token_url: "http://127.0.0.1:9000/token".to_string(),
            revocation_url: None,
        });
        assert_eq!(config.endpoints().revocation_url, None);
        config.validate().expect("override is valid");
    }

    /// Validates that each invalid field is reported.
    ///
    /// Assertions:
    /// - Every mutation below fails validation with a message naming the
    ///   field.
    #[test]
    fn test_validation_rejects_bad_fields() {
        let cases: Vec<(&str, Box<dyn Fn(&mut LinkConfig)>)> = vec![
            ("client_id", Box::new(|c| c.client_id.clear())),
            ("client_secret", Box::new(|c| c.client_secret.clear())),
            ("installation_secret", Box::new(|c| c.installation_secret.clear())),
            ("redirect_uri", Box::new(|c| c.redirect_uri = "/relative".to_string())),
            ("redirect_uri", Box::new(|c| c.redirect_uri = "ftp://host/cb".to_string())),
            ("rate_limit_capacity", Box::new(|c| c.rate_limit_capacity = 0)),
            ("rate_limit_refill_rate", Box::new(|c| c.rate_limit_refill_rate = 0.0)),
            ("max_attempts", Box::new(|c| c.retry_policy.max_attempts = 0)),
            ("multiplier", Box::new(|c| c.retry_policy.multiplier = 0.5)),
            ("jitter_fraction", Box::new(|c| c.retry_policy.jitter_fraction = 1.0)),
            ("scopes", Box::new(|c| c.scopes = vec!["a b".to_string()])),
        ];
        for (field, mutate) in cases {
            let mut config = valid();
            mutate(&mut config);
            let err = config.validate().expect_err(field);
            assert!(err.to_string().contains(field), "{field}: {err}");
        }
    }

    #[test]
    fn test_deserialize_toml_with_defaults() {
        let raw = r#"
            client_id = "cid"
            client_secret = "cs"
            redirect_uri = "https://example.com/cb"
            installation_secret = "k"
            region = "eu"
            refresh_margin = 90
            [retry_policy]
            initial_delay = 0.5
        "#;
        let config: LinkConfig = toml::from_str(raw).expect("parse");
        assert_eq!(config.region, Region::Europe);
        assert_eq!(config.refresh_margin, Duration::from_secs(90));
        assert_eq!(config.retry_policy.initial_delay, Duration::from_millis(500));
        assert_eq!(config.retry_policy.max_delay, DEFAULT_RETRY_MAX_DELAY);
        assert_eq!(config.flow_ttl, DEFAULT_FLOW_TTL);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let raw = r#"{"client_id":"c","client_secret":"s","redirect_uri":"https://e.com",
            "installation_secret":"k","colour":"blue"}"#;
        assert!(serde_json::from_str::<LinkConfig>(raw).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", valid());
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("install-key"));
    }
}
