//! OAuth 2.0 protocol primitives
//!
//! Pure building blocks used by the authorization flow engine:
//!
//! ```text
//! ┌──────────────────┐
//! │ AuthorizationFlow│  (tokenlink-core)
//! └────────┬─────────┘
//!          │
//!          ├──► PkceEngine       verifier + S256 challenge
//!          ├──► CsrfStateGuard   state token, constant-time check
//!          └──► redact_token     log-safe credential rendering
//! ```
//!
//! Nothing here performs I/O or keeps state between calls.

pub mod csrf;
pub mod pkce;
pub mod redact;

pub use csrf::CsrfStateGuard;
pub use pkce::{is_valid_verifier, PkceEngine, PkcePair, CHALLENGE_METHOD};
pub use redact::redact_token;
