//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset. Security warnings stay visible
/// even when everything else is turned down.
pub const DEFAULT_FILTER: &str = "info,drawbridge::security=warn";

/// Builds the filter: `RUST_LOG` if set, otherwise `default_filter`.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs a console subscriber as the global default.
///
/// Returns `false` if a global subscriber was already installed, which
/// is harmless and common in tests.
pub fn init(default_filter: &str) -> bool {
    let console = fmt::layer().with_target(true).with_level(true);
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(console)
        .try_init()
        .is_ok()
}
