//! Tracing setup for binaries embedding the cache layer.
//!
//! The configured level applies to Squadline's own crates; dependencies
//! (redis, deadpool, tokio) stay at `warn` unless `RUST_LOG` says otherwise.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

/// Crates whose events follow the configured level.
const OWN_TARGETS: [&str; 2] = ["squadline_cache", "squadline"];

fn directives(level: &str) -> String {
    let mut out = String::from("warn");
    for target in OWN_TARGETS {
        out.push_str(&format!(",{target}={level}"));
    }
    out
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_new(directives(level)).unwrap_or_else(|_| EnvFilter::new("warn"))
}

pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Install a stderr fmt subscriber. `RUST_LOG`, when set and valid, wins over `level`.
pub fn init_tracing_with_level(level: &str) {
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| filter_for(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

/// Switch the level of Squadline's crates at runtime. Returns `false` if
/// tracing was not initialised through this module.
pub fn apply_logging_level(level: &str) -> bool {
    match LOG_RELOAD_HANDLE.get() {
        Some(handle) => handle.modify(|f| *f = filter_for(level)).is_ok(),
        None => false,
    }
}
