#![forbid(unsafe_code)]

//! Logging init: structured `tracing` output on stderr.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,gdrelay=debug,tower_http=info";

/// `RUST_LOG` wins when it parses; otherwise the relay's default filter.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("initializing logging: {err}"))
}
