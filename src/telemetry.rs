//! Tracing initialization.
//!
//! Library code only emits `tracing` events; installing a subscriber is
//! the embedding application's call. [`init`] is the batteries-included
//! option for binaries and examples.

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a formatted subscriber with an `RUST_LOG`-driven filter
/// (default `info`) and span-trace capture for error reports.
///
/// Safe to call more than once; only the first call installs.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(ErrorLayer::default())
        .try_init();
}
