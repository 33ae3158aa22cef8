//! Domain constants
//!
//! Endpoint presets for Login with Amazon and the defaults of every
//! configuration option.

use std::time::Duration;

// Login with Amazon endpoints
pub const NA_AUTHORIZATION_URL: &str = "https://www.amazon.com/ap/oa";
pub const NA_TOKEN_URL: &str = "https://api.amazon.com/auth/o2/token";
pub const NA_REVOCATION_URL: &str = "https://api.amazon.com/auth/o2/revoke";

pub const EU_AUTHORIZATION_URL: &str = "https://www.amazon.co.uk/ap/oa";
pub const EU_TOKEN_URL: &str = "https://api.amazon.co.uk/auth/o2/token";
pub const EU_REVOCATION_URL: &str = "https://api.amazon.co.uk/auth/o2/revoke";

pub const FE_AUTHORIZATION_URL: &str = "https://www.amazon.co.jp/ap/oa";
pub const FE_TOKEN_URL: &str = "https://api.amazon.co.jp/auth/o2/token";
pub const FE_REVOCATION_URL: &str = "https://api.amazon.co.jp/auth/o2/revoke";

pub const DEFAULT_SCOPE: &str = "smart_home";
pub const BEARER_TOKEN_TYPE: &str = "Bearer";

// Encrypted store
pub const STORE_FORMAT_VERSION: u32 = 2;
pub const DEFAULT_STORE_PATH: &str = "tokenlink/tokens.json";

// Lifecycle and flow timing
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);
pub const DEFAULT_REFRESH_JITTER: Duration = Duration::from_secs(30);
pub const DEFAULT_FLOW_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(300);

// Rate limiting
pub const DEFAULT_RATE_LIMIT_CAPACITY: u32 = 20;
pub const DEFAULT_RATE_LIMIT_REFILL_RATE: f64 = 10.0;

// Retry
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_RETRY_JITTER: f64 = 0.25;
