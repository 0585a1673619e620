//! Logging setup for the CLI.
//!
//! `bv_core` logs through the `log` facade; the fmt subscriber installs a
//! log bridge on init so those records land here too.

use tracing_subscriber::EnvFilter;

/// Env var overriding the `-v` verbosity with a full filter directive.
pub const LOG_ENV: &str = "BV_LOG";

/// 0 → warn, 1 → info, 2 → debug, 3+ → trace
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber on stderr. Safe to call more than once.
pub fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(verbosity_to_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .try_init();
}
