//! Tracing setup for ragline binaries.
//!
//! Log levels come from `RUST_LOG` when it is set, otherwise from the
//! `default_level` passed in (e.g. `"info"`, or `"ragline=debug,warn"`).
//! Every initializer is safe to call more than once; only the first call in
//! a process installs a subscriber.
//!
//! ```rust,ignore
//! ragline_telemetry::init_telemetry("ragline", "info");
//! tracing::info!(source = "langchain.pdf", "ingesting");
//! ```

pub mod memory;

pub use memory::{InMemorySpanLayer, SpanRecord, SpanStorage};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install a human-readable subscriber writing to stderr.
pub fn init_telemetry(service_name: &str, default_level: &str) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter(default_level));
    finish(tracing_subscriber::registry().with(fmt_layer).try_init(), service_name);
}

/// Install a subscriber writing one JSON object per event to stderr.
pub fn init_json_telemetry(service_name: &str, default_level: &str) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_current_span(true)
        .with_span_list(false)
        .with_filter(env_filter(default_level));
    finish(tracing_subscriber::registry().with(fmt_layer).try_init(), service_name);
}

/// Like [`init_telemetry`], additionally capturing every closed span into
/// `storage` regardless of the log level.
pub fn init_with_storage(service_name: &str, default_level: &str, storage: SpanStorage) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter(default_level));
    finish(
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(InMemorySpanLayer::new(storage))
            .try_init(),
        service_name,
    );
}

// try_init only fails when a global subscriber is already installed.
fn finish(result: Result<(), TryInitError>, service_name: &str) {
    match result {
        Ok(()) => tracing::debug!(service.name = service_name, "telemetry initialized"),
        Err(err) => tracing::debug!(service.name = service_name, error = %err, "telemetry already initialized"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_telemetry("ragline-test", "warn");
        init_telemetry("ragline-test", "warn");
        init_json_telemetry("ragline-test", "warn");
        init_with_storage("ragline-test", "warn", SpanStorage::new());
        tracing::info!("still logging");
    }
}
