// Tracing setup
//
// Diagnostics go to stderr so command output on stdout stays machine-readable.
// RUST_LOG wins when no -v flag is given.

use tracing_subscriber::{fmt, EnvFilter};

/// Filter for a `-v` count: 0 = RUST_LOG or warn, 1 = info, 2 = debug, 3+ = trace
pub fn filter_for_verbosity(verbosity: u8) -> EnvFilter {
    match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init_tracing(verbosity: u8) {
    let _ = fmt()
        .with_env_filter(filter_for_verbosity(verbosity))
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init();
}
