//! # Tokenlink Domain
//!
//! Data types shared by every Tokenlink crate.
//!
//! This crate contains:
//! - Token sets, token endpoint payloads and the encrypted store format
//! - Authorization flow and token lifecycle states
//! - The typed installation configuration
//! - Domain error types and constants
//!
//! ## Architecture
//! - No dependencies on other Tokenlink crates
//! - No I/O; pure data structures and validation

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
