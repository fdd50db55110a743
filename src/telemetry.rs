//! Tracing initialization for binaries and examples embedding the engine.
//!
//! The library itself only emits `tracing` events; whether and how they are
//! rendered is the embedder's choice. `init_tracing` is a convenience that
//! installs a fmt subscriber honoring `RUST_LOG`, defaulting to `info` for
//! this crate.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops when a global
/// subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("marginalia=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
