//! Tracing subscriber bootstrap.
//!
//! The engine only emits `tracing` events; installing a subscriber is up to
//! the embedding application.  These helpers cover the common cases and are
//! safe to call more than once.

use tracing_subscriber::EnvFilter;

/// Install a compact human-readable subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`.  Returns `false` when a
/// global subscriber was already installed.
pub fn init_tracing(default_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}

/// Install a subscriber that writes one JSON object per line.
pub fn init_tracing_json(default_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .json()
        .with_current_span(false)
        .try_init()
        .is_ok()
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
