//! CLI argument parsing using clap

use super::OutputFormat;
use crate::distributed::protocol::{CreateJobMessage, Message};
use crate::distributed::ReadMode;
use crate::job::{JobId, JobRequest, MAX_ITERATIONS};
use crate::registry::HostRecord;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Standalone mode (default) - run one benchmark job locally and print it
    Standalone,
    /// Service mode - run the node service (accepts jobs, hosts and batches)
    Service,
    /// Control mode - send one request to a running node service
    Control,
}

/// FetchPulse - image retrieval latency and reliability benchmark
#[derive(Parser, Debug)]
#[command(name = "fetchpulse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: standalone, service, or control
    #[arg(long, value_enum, default_value = "standalone")]
    pub mode: ExecutionMode,

    /// Image URL to benchmark (standalone mode only)
    #[arg(short = 'u', long = "url", value_name = "URL")]
    pub target_url: Option<String>,

    // === Benchmark Options ===
    /// Number of trials per job
    #[arg(short = 'n', long)]
    pub iterations: Option<u32>,

    /// Maximum trials shown in a report
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Timeout for one trial (e.g., 30s, 1m)
    #[arg(long)]
    pub trial_timeout: Option<String>,

    /// Connect timeout for one trial (e.g., 10s)
    #[arg(long)]
    pub connect_timeout: Option<String>,

    /// Maximum concurrently running jobs (service mode)
    #[arg(long)]
    pub max_active_jobs: Option<usize>,

    // === Service Options ===
    /// Port for service to listen on (service mode only)
    #[arg(long)]
    pub listen_port: Option<u16>,

    /// Address for service to bind (service mode only)
    #[arg(long)]
    pub bind_address: Option<String>,

    /// Label reported in job results (defaults to hostname)
    #[arg(long)]
    pub host_label: Option<String>,

    // === Peer Options ===
    /// Timeout for one peer call (e.g., 10s)
    #[arg(long)]
    pub peer_timeout: Option<String>,

    /// Extra attempts after a failed peer call
    #[arg(long)]
    pub peer_retries: Option<u32>,

    /// Batch read semantics
    #[arg(long, value_enum)]
    pub read_mode: Option<ReadMode>,

    // === Control Options ===
    /// Node service to contact (control mode only)
    #[arg(long, default_value = "127.0.0.1:9999")]
    pub server: String,

    /// Request to send (control mode only)
    #[command(subcommand)]
    pub request: Option<Request>,

    // === Output Options ===
    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Also write the report as JSON to this file
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    // === Configuration File ===
    /// TOML configuration file
    #[arg(short = 'c', long, env = "FETCHPULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Dry run - validate configuration without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Control-mode request
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Probe the service
    Status,

    /// Create a benchmark job on the service host
    CreateJob {
        url: String,
        #[arg(short = 'n', long)]
        iterations: Option<u32>,
    },

    /// Show a job's results
    GetJob {
        job_id: JobId,
        #[arg(short = 'l', long)]
        limit: Option<usize>,
    },

    /// Attempt to modify a job (always rejected)
    UpdateJob {
        job_id: JobId,
        url: String,
        #[arg(short = 'n', long)]
        iterations: Option<u32>,
    },

    /// Attempt to delete a job (always rejected)
    DeleteJob { job_id: JobId },

    /// Add a host to the registry
    RegisterHost {
        address: String,
        label: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Show one host
    GetHost { label: String },

    /// Replace a host's address or description
    UpdateHost {
        address: String,
        label: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Remove a host from the registry
    RemoveHost { label: String },

    /// List registered hosts
    ListHosts,

    /// Fan a benchmark job out to every registered host
    CreateBatch {
        url: String,
        #[arg(short = 'n', long)]
        iterations: Option<u32>,
    },

    /// Show merged results of a batch
    GetBatch {
        batch_id: u64,
        #[arg(short = 'l', long)]
        limit: Option<usize>,
    },
}

fn host_record(address: String, label: String, description: Option<String>) -> HostRecord {
    HostRecord {
        address,
        label,
        description,
    }
}

impl Request {
    /// Protocol message carrying this request
    pub fn into_message(self) -> Message {
        match self {
            Request::Status => Message::Status,
            Request::CreateJob { url, iterations } => {
                Message::CreateJob(CreateJobMessage::new(JobRequest::new(url, iterations)))
            }
            Request::GetJob { job_id, limit } => Message::GetJob { job_id, limit },
            Request::UpdateJob {
                job_id,
                url,
                iterations,
            } => Message::UpdateJob {
                job_id,
                request: JobRequest::new(url, iterations),
            },
            Request::DeleteJob { job_id } => Message::DeleteJob { job_id },
            Request::RegisterHost {
                address,
                label,
                description,
            } => Message::RegisterHost(host_record(address, label, description)),
            Request::GetHost { label } => Message::GetHost { label },
            Request::UpdateHost {
                address,
                label,
                description,
            } => Message::UpdateHost(host_record(address, label, description)),
            Request::RemoveHost { label } => Message::RemoveHost { label },
            Request::ListHosts => Message::ListHosts,
            Request::CreateBatch { url, iterations } => {
                Message::CreateBatch(JobRequest::new(url, iterations))
            }
            Request::GetBatch { batch_id, limit } => Message::GetBatch { batch_id, limit },
        }
    }
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(n) = self.iterations {
            if n == 0 || n > MAX_ITERATIONS {
                anyhow::bail!("iterations must be between 1 and {} (got {})", MAX_ITERATIONS, n);
            }
        }

        match self.mode {
            ExecutionMode::Standalone => {
                if self.target_url.is_none() {
                    anyhow::bail!("standalone mode requires a target URL");
                }
                if self.request.is_some() {
                    anyhow::bail!("requests can only be sent in control mode");
                }
            }
            ExecutionMode::Service => {
                if self.target_url.is_some() {
                    anyhow::bail!("service mode does not take a target URL");
                }
                if self.request.is_some() {
                    anyhow::bail!("requests can only be sent in control mode");
                }
            }
            ExecutionMode::Control => {
                if self.request.is_none() {
                    anyhow::bail!("control mode requires a request (e.g. 'status')");
                }
            }
        }

        Ok(())
    }
}
