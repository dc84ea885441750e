//! Logging init for binaries embedding the provisioning crates.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "info,rc_auth=debug,rc_download=info,rc_meta=info";

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive`.
///
/// Returns an error instead of panicking when a global subscriber is already
/// installed, so tests and embedding applications can call it freely.
pub fn init_logging(default_directive: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .context("Invalid log filter directive")?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to install tracing subscriber")?;

    tracing::debug!("Logging initialized");
    Ok(())
}
