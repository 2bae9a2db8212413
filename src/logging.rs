//! `tracing` subscriber setup for the command-line tool.

use std::io;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use crate::error::{QrStyleError, Result};

/// Environment variable that overrides the requested filter.
pub const LOG_ENV: &str = "QR_STYLED_LOG";

/// Installs a stderr subscriber filtered by `QR_STYLED_LOG`, or `default_level` when unset.
///
/// Does nothing if a global subscriber is already installed.
pub fn init(default_level: &str) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let level = std::env::var(LOG_ENV).unwrap_or_else(|_| default_level.to_string());
    let env_filter = EnvFilter::try_new(level.as_str())
        .map_err(|e| QrStyleError::Config(format!("Invalid log level '{level}': {e}")))?;

    // Images may go to stdout, so logs stay on stderr.
    Registry::default()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .try_init()
        .map_err(|e| QrStyleError::Config(format!("Failed to install tracing subscriber: {e}")))
}
