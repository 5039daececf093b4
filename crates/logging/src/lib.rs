//! Shared tracing setup for the daemon and CLI binaries.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` always wins when set; otherwise falls back to
/// `"<default_level>,capsule=<default_level>"` so capsule's own crates are
/// never drowned out by a quieter default from a dependency.
pub fn init(default_level: &str) {
    let fallback = format!("{default_level},capsule={default_level}");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Same as [`init`] but never panics if a subscriber is already installed;
/// used by tests and by CLI subcommands that may run after the daemon's
/// own logging is already live in the same process (e.g. integration tests).
pub fn try_init(default_level: &str) {
    let fallback = format!("{default_level},capsule={default_level}");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}
