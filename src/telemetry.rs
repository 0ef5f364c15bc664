//! Tracing initialization (fmt subscriber + `RUST_LOG`-style filtering).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber.
///
/// Filtering defaults to `info` and can be overridden through the standard
/// `RUST_LOG` environment variable. Calling this twice is harmless: the
/// second call fails `try_init` and is ignored, which keeps tests that share
/// a process from panicking.
pub fn init_telemetry() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
