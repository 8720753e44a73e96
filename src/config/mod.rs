//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//!
//! Every section is optional in the file; missing values take the defaults
//! below, and CLI flags override both (see [`toml::merge_cli_with_config`]).

pub mod cli;
pub mod toml;
pub mod validator;

use crate::distributed::{PeerSettings, ReadMode};
use crate::fetch::curl::CurlSettings;
use crate::job::{JobSettings, DEFAULT_ITERATIONS, DEFAULT_RESULT_LIMIT};
use crate::job::registry::DEFAULT_MAX_ACTIVE_JOBS;
use crate::registry::HostRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub peers: PeersConfig,
    /// Hosts loaded into the registry at service start
    #[serde(default)]
    pub hosts: Vec<HostRecord>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Node service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Port to listen on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Label reported in job results; defaults to the machine hostname
    #[serde(default)]
    pub host_label: Option<String>,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_listen_port() -> u16 {
    9999
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            host_label: None,
            bind_address: default_bind_address(),
        }
    }
}

impl ServiceConfig {
    /// Configured label, or the machine hostname
    pub fn host_label(&self) -> String {
        self.host_label
            .clone()
            .unwrap_or_else(crate::distributed::node_service::get_node_id)
    }

    /// `bind_address:listen_port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.listen_port)
    }
}

/// Benchmark job configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Iterations when a request gives none
    #[serde(default = "default_iterations")]
    pub default_iterations: u32,
    /// Trials per snapshot when a read gives no limit
    #[serde(default = "default_result_limit")]
    pub default_result_limit: usize,
    /// Upper bound on one trial's fetch
    #[serde(default = "default_trial_timeout_secs")]
    pub trial_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Admission limit for concurrently running jobs
    #[serde(default = "default_max_active_jobs")]
    pub max_active_jobs: usize,
}

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

fn default_result_limit() -> usize {
    DEFAULT_RESULT_LIMIT
}

fn default_trial_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_active_jobs() -> usize {
    DEFAULT_MAX_ACTIVE_JOBS
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            default_iterations: default_iterations(),
            default_result_limit: default_result_limit(),
            trial_timeout_secs: default_trial_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_active_jobs: default_max_active_jobs(),
        }
    }
}

impl BenchmarkConfig {
    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            default_iterations: self.default_iterations,
            max_active_jobs: self.max_active_jobs,
        }
    }

    pub fn curl_settings(&self) -> CurlSettings {
        CurlSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            timeout: Duration::from_secs(self.trial_timeout_secs),
            ..CurlSettings::default()
        }
    }
}

/// Outbound peer call configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeersConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Extra attempts after a failed call
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Batch read semantics
    #[serde(default)]
    pub read_mode: ReadMode,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            read_mode: ReadMode::default(),
        }
    }
}

impl PeersConfig {
    pub fn peer_settings(&self) -> PeerSettings {
        PeerSettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retries: self.retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Report format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Service:")?;
        writeln!(f, "  Listen:            {}", self.service.listen_addr())?;
        writeln!(f, "  Host label:        {}", self.service.host_label())?;
        writeln!(f, "Benchmark:")?;
        writeln!(f, "  Default iterations: {}", self.benchmark.default_iterations)?;
        writeln!(f, "  Result limit:      {}", self.benchmark.default_result_limit)?;
        writeln!(f, "  Trial timeout:     {}s", self.benchmark.trial_timeout_secs)?;
        writeln!(f, "  Max active jobs:   {}", self.benchmark.max_active_jobs)?;
        writeln!(f, "Peers:")?;
        writeln!(
            f,
            "  Timeout/retries:   {}s / {} ({}ms backoff)",
            self.peers.request_timeout_secs, self.peers.retries, self.peers.retry_backoff_ms
        )?;
        writeln!(f, "  Batch reads:       {}", self.peers.read_mode)?;
        write!(f, "Hosts:               {}", self.hosts.len())
    }
}
