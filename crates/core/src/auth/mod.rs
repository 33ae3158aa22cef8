//! Authorization-code flow with PKCE
//!
//! ```text
//!  begin() ──► AwaitingCallback ──complete()──► Exchanging ──► Complete
//!                    │                              │
//!                    └── error / state / expiry ────┴────────► Failed
//! ```
//!
//! The PKCE verifier and CSRF state live only inside the engine and are
//! dropped as soon as `complete()` takes the flow, whatever the outcome.

pub mod flow;

pub use flow::{AuthorizationFlowEngine, AuthorizationRequest};
