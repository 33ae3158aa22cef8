//! # Tokenlink Infrastructure
//!
//! Infrastructure implementations of the core ports.
//!
//! This crate contains:
//! - The reqwest token-endpoint client and resource transport
//! - File blob storage with atomic replace
//! - The configuration loader (`.env`, environment, TOML, JSON)
//! - Tracing bootstrap
//! - The per-installation [`Installation`] context
//!
//! ## Architecture
//! - Implements traits defined in `tokenlink-core`
//! - Contains all "impure" code (network and filesystem I/O)

pub mod config;
pub mod context;
pub mod errors;
pub mod http;
pub mod observability;
pub mod storage;

pub use context::Installation;
pub use errors::InfraError;
pub use http::{HttpClientBuilder, HttpTokenEndpoint, ReqwestTransport};
pub use observability::init_tracing;
pub use storage::FileBlobStorage;
