//! Log output for wodsim binaries.
//!
//! The library only emits `tracing` events; a binary picks the level and
//! installs the subscriber once at startup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the subscriber at WARN
///
/// A plain `wodsim run` then prints only its report. RUST_LOG wins over the
/// default, e.g. `RUST_LOG=wod_core=debug` shows every set and rest decision.
pub fn init() {
    init_with_level("warn")
}

/// Install the subscriber with `default_level` unless RUST_LOG is set
///
/// Output goes to stderr, leaving stdout to JSON and CSV.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// Level for a `-v` count: warn, info, then debug
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Route debug output through the test harness; safe to call repeatedly
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
