//! Logging setup
//!
//! Diagnostics go to stderr through `tracing`; reports stay on stdout.

use crate::Result;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "info,fetchpulse=debug"
    } else {
        "info"
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `verbose`. Calling this twice is an error.
pub fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    if json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    }

    tracing::debug!(verbose, json, "logging initialized");
    Ok(())
}
