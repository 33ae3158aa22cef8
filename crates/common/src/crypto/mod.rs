//! Authenticated encryption for secrets at rest.

pub mod encryption;

pub use encryption::{EncryptionService, SealedPayload};
