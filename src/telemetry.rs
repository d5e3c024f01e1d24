//! Tracing subscriber setup for demos and tests.
//!
//! Library code only emits through `tracing`; installing a subscriber is
//! the host process's job. This helper covers the common case: an
//! env-filtered fmt subscriber on stderr, `RUST_LOG` respected, `info` by
//! default.

use tracing_subscriber::EnvFilter;

/// Install the default subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
