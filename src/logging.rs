//! Structured logging init, in the shape of `annactl`'s `tracing_subscriber`
//! setup: an `EnvFilter` seeded from the environment plus a plain `fmt` layer.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber. Safe to call once at process
/// start; a second call is a no-op (errors are swallowed, matching the
/// teacher's `init()` which never returns a `Result` to the caller).
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("ANGELA_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("angela=info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().without_time())
        .try_init();
}
