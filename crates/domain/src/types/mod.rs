//! Domain data types

pub mod flow;
pub mod http;
pub mod lifecycle;
pub mod store;
pub mod token;

pub use flow::{CallbackParams, FlowStatus};
pub use http::{parse_retry_after, ApiRequest, ApiResponse, HttpMethod};
pub use lifecycle::{LifecycleState, ReauthEvent, ReauthReason};
pub use store::EncryptedBlob;
pub use token::{TokenErrorResponse, TokenResponse, TokenSet};
