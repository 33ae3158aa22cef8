//! Token lifecycle: ownership of the current token set, single-flight
//! refresh and proactive refresh scheduling.

pub mod manager;
pub mod scheduler;

pub use manager::{LifecycleSettings, TokenLifecycleManager};
pub use scheduler::RefreshScheduler;
