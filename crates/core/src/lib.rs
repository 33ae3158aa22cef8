//! # Tokenlink Core
//!
//! Authorization and token lifecycle logic, free of I/O.
//!
//! This crate contains:
//! - The `OAuthError` taxonomy and its retry classification
//! - Port interfaces implemented by `tokenlink-infra`
//! - `AuthorizationFlowEngine`, `TokenStore`, `TokenLifecycleManager`,
//!   `RefreshScheduler` and `ApiGateway`
//!
//! ## Architecture Principles
//! - Depends only on `tokenlink-common` and `tokenlink-domain`
//! - No HTTP, filesystem or platform code
//! - All external dependencies via traits in [`ports`]

pub mod auth;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod ports;
pub mod settings;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use auth::{AuthorizationFlowEngine, AuthorizationRequest};
pub use error::{OAuthError, OAuthResult};
pub use gateway::ApiGateway;
pub use lifecycle::{LifecycleSettings, RefreshScheduler, TokenLifecycleManager};
pub use ports::{BlobStorage, ReauthObserver, ResourceTransport, TokenEndpoint};
pub use store::TokenStore;
