//! Tracing bootstrap
//!
//! `RUST_LOG` takes precedence over the configured level. Installation is
//! process-global; once a subscriber is set, later calls are no-ops.

use tokenlink_domain::LoggingSettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber described by `settings`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(settings: &LoggingSettings) -> bool {
    let filter = build_filter(settings);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if settings.json {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    match installed {
        Ok(()) => {
            tracing::debug!(level = %settings.level, json = settings.json, "Tracing initialised");
            true
        }
        Err(_) => false,
    }
}

fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
