//! Tracing bootstrap.
//!
//! Filter comes from `RUST_LOG` (default `info`). Safe to call more than
//! once: only the first call installs a subscriber.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match format {
        LogFormat::Compact => builder.compact().try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}
