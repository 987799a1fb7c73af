//! Process-wide `tracing` subscriber.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `AIDIGEST_LOG` (an `EnvFilter` directive) wins over the `-v` count.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Environment variable holding an explicit filter directive.
pub const LOG_ENV: &str = "AIDIGEST_LOG";

/// Maps the number of `-v` flags to a default level.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn resolve_env_filter(verbosity: u8) -> EnvFilter {
    if let Ok(directive) = std::env::var(LOG_ENV)
        && let Ok(filter) = EnvFilter::try_new(directive.trim())
    {
        return filter;
    }
    EnvFilter::new(level_for(verbosity))
}

/// Installs the global subscriber. Calling it twice is a no-op.
pub fn init(verbosity: u8) {
    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry()
        .with(resolve_env_filter(verbosity))
        .with(layer)
        .try_init();
}
