//! Local log output
//!
//! Installs a `tracing-subscriber` fmt subscriber. `RUST_LOG` wins when
//! set; otherwise the scenario's log level applies to this crate.

use crate::scenario::LogLevel;
use tracing_subscriber::EnvFilter;

fn directive(level: LogLevel) -> String {
    format!("h2harness={}", level.as_str().to_ascii_lowercase())
}

/// Install the global subscriber; later calls are no-ops
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_test_writer()
        .try_init();
}
