//! Configuration validation

use super::*;
use crate::job::MAX_ITERATIONS;
use anyhow::{Context, Result};
use std::collections::HashSet;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_service(&config.service)?;
    validate_benchmark(&config.benchmark)?;
    validate_peers(&config.peers)?;
    validate_hosts(&config.hosts)?;

    Ok(())
}

/// Validate service configuration
pub fn validate_service(service: &ServiceConfig) -> Result<()> {
    if service.bind_address.trim().is_empty() {
        anyhow::bail!("service.bind_address must not be empty");
    }

    if let Some(label) = &service.host_label {
        if label.trim().is_empty() {
            anyhow::bail!("service.host_label must not be empty when set");
        }
    }

    Ok(())
}

/// Validate benchmark configuration
pub fn validate_benchmark(benchmark: &BenchmarkConfig) -> Result<()> {
    if benchmark.default_iterations == 0 || benchmark.default_iterations > MAX_ITERATIONS {
        anyhow::bail!(
            "benchmark.default_iterations must be between 1 and {} (got {})",
            MAX_ITERATIONS,
            benchmark.default_iterations
        );
    }
    if benchmark.default_result_limit == 0 {
        anyhow::bail!("benchmark.default_result_limit must be at least 1");
    }
    if benchmark.trial_timeout_secs == 0 {
        anyhow::bail!("benchmark.trial_timeout_secs must be greater than 0");
    }
    if benchmark.connect_timeout_secs == 0 {
        anyhow::bail!("benchmark.connect_timeout_secs must be greater than 0");
    }
    if benchmark.connect_timeout_secs > benchmark.trial_timeout_secs {
        anyhow::bail!(
            "benchmark.connect_timeout_secs ({}) must not exceed trial_timeout_secs ({})",
            benchmark.connect_timeout_secs,
            benchmark.trial_timeout_secs
        );
    }
    if benchmark.max_active_jobs == 0 {
        anyhow::bail!("benchmark.max_active_jobs must be at least 1");
    }

    // Each active job holds one OS thread
    if benchmark.max_active_jobs > 1024 {
        tracing::warn!(
            max_active_jobs = benchmark.max_active_jobs,
            "very high active job limit, each job runs on its own thread"
        );
    }

    Ok(())
}

/// Validate peer call configuration
pub fn validate_peers(peers: &PeersConfig) -> Result<()> {
    if peers.request_timeout_secs == 0 {
        anyhow::bail!("peers.request_timeout_secs must be greater than 0");
    }

    if peers.retries > 10 {
        tracing::warn!(retries = peers.retries, "high peer retry count delays batch failures");
    }

    Ok(())
}

/// Validate seed host records
pub fn validate_hosts(hosts: &[HostRecord]) -> Result<()> {
    let mut labels = HashSet::new();

    for (index, host) in hosts.iter().enumerate() {
        if host.label.trim().is_empty() {
            anyhow::bail!("Host {} label must not be empty", index);
        }
        if host.address.trim().is_empty() {
            anyhow::bail!("Host '{}' address must not be empty", host.label);
        }
        validate_address(&host.address)
            .with_context(|| format!("Host '{}' has an invalid address", host.label))?;
        if !labels.insert(host.label.as_str()) {
            anyhow::bail!("Duplicate host label '{}'", host.label);
        }
    }

    Ok(())
}

/// `host:port` with a numeric, non-zero port
fn validate_address(address: &str) -> Result<()> {
    let (host, port) = address
        .rsplit_once(':')
        .with_context(|| format!("'{}' is missing a port (expected host:port)", address))?;

    if host.is_empty() {
        anyhow::bail!("'{}' is missing a host", address);
    }

    let port: u16 = port
        .parse()
        .with_context(|| format!("'{}' has an invalid port", address))?;
    if port == 0 {
        anyhow::bail!("'{}' has port 0", address);
    }

    Ok(())
}
