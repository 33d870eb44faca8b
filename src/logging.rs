//! Tracing subscriber setup
//!
//! Libraries in this workspace only emit `tracing` events. Binaries and
//! tests that want to see them call [`init`] once.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`)
///
/// Does nothing if a global subscriber is already installed, so tests may
/// call it repeatedly.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`] with a custom filter used when `RUST_LOG` is unset
pub fn init_with_default(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_thread_names(true))
        .try_init();
}
