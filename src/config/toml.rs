//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Load the file named by `--config`, or defaults when none is given
pub fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => parse_toml_file(path)?,
        None => Config::default(),
    };
    merge_cli_with_config(cli, config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Service
    if let Some(port) = cli.listen_port {
        config.service.listen_port = port;
    }
    if let Some(addr) = &cli.bind_address {
        config.service.bind_address = addr.clone();
    }
    if let Some(label) = &cli.host_label {
        config.service.host_label = Some(label.clone());
    }

    // Benchmark
    if let Some(iterations) = cli.iterations {
        config.benchmark.default_iterations = iterations;
    }
    if let Some(limit) = cli.limit {
        config.benchmark.default_result_limit = limit;
    }
    if let Some(timeout) = &cli.trial_timeout {
        config.benchmark.trial_timeout_secs = parse_duration(timeout)?;
    }
    if let Some(timeout) = &cli.connect_timeout {
        config.benchmark.connect_timeout_secs = parse_duration(timeout)?;
    }
    if let Some(max) = cli.max_active_jobs {
        config.benchmark.max_active_jobs = max;
    }

    // Peers
    if let Some(timeout) = &cli.peer_timeout {
        config.peers.request_timeout_secs = parse_duration(timeout)?;
    }
    if let Some(retries) = cli.peer_retries {
        config.peers.retries = retries;
    }
    if let Some(mode) = cli.read_mode {
        config.peers.read_mode = mode;
    }

    // Output
    if let Some(format) = cli.format {
        config.output.format = format;
    }

    Ok(config)
}

/// Parse a duration string (e.g., "30s", "5m", "1h") to seconds
///
/// A bare number is taken as seconds; sub-second values round up.
pub fn parse_duration(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms
            .trim()
            .parse()
            .with_context(|| format!("Invalid duration format: {}", s))?;
        return Ok(ms.div_ceil(1000));
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("sec").or_else(|| s.strip_suffix('s')) {
        (n, 1u64)
    } else if let Some(n) = s.strip_suffix("min").or_else(|| s.strip_suffix('m')) {
        (n, 60)
    } else if let Some(n) = s.strip_suffix("hr").or_else(|| s.strip_suffix('h')) {
        (n, 3600)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration format: {}", s))?;

    num.checked_mul(multiplier)
        .with_context(|| format!("Duration out of range: {}", s))
}
