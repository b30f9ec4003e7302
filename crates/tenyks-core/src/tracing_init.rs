//! Logging setup for the tenyks binary.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. With `log_json` every
/// event is one JSON object per line.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let (json, text) = if log_json {
        (Some(fmt::layer().json().with_current_span(false)), None)
    } else {
        (None, Some(fmt::layer().with_target(true)))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

/// `<crate>=<level>` for every tenyks crate.
pub fn default_filter(level: &str) -> String {
    ["tenyks", "tenyks_robot", "tenyks_core"]
        .map(|krate| format!("{krate}={level}"))
        .join(",")
}
