//! Log output setup

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global subscriber
///
/// `RUST_LOG` overrides the default `info` filter, e.g.
/// `RUST_LOG=wh_core=debug`. Logs go to stderr so command output on stdout
/// stays clean.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
