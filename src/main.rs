//! FetchPulse CLI entry point

use anyhow::{Context, Result};
use fetchpulse::config::cli::{Cli, ExecutionMode};
use fetchpulse::config::{toml, validator, Config};
use fetchpulse::distributed::protocol::Message;
use fetchpulse::distributed::{BatchCoordinator, NodeService, ServiceState, TcpPeerClient};
use fetchpulse::fetch::curl::CurlFetcher;
use fetchpulse::job::{JobRegistry, JobRequest};
use fetchpulse::output;
use fetchpulse::registry::HostRegistry;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse_args();
    cli.validate()?;

    fetchpulse::logging::init_logging(cli.debug, cli.json_logs)?;

    let config = toml::load_config(&cli)?;
    validator::validate_config(&config).context("Configuration validation failed")?;

    if cli.dry_run {
        println!("{}", config);
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(ExitCode::SUCCESS);
    }

    match cli.mode {
        ExecutionMode::Standalone => run_standalone(&cli, config),
        ExecutionMode::Service => run_service(config),
        ExecutionMode::Control => run_control(cli, config),
    }
}

/// Run one benchmark job locally and print its report
fn run_standalone(cli: &Cli, config: Config) -> Result<ExitCode> {
    let target_url = cli
        .target_url
        .clone()
        .context("standalone mode requires a target URL")?;

    let fetcher = Arc::new(CurlFetcher::new(config.benchmark.curl_settings()));
    let jobs = JobRegistry::new(
        config.service.host_label(),
        fetcher,
        config.benchmark.job_settings(),
    );

    let dispatched = jobs.create(&JobRequest::new(target_url, cli.iterations))?;
    let job = dispatched.job;

    if config.output.format == fetchpulse::config::OutputFormat::Text {
        println!(
            "Running {} trials against {}...",
            job.iteration_count(),
            job.target_url()
        );
        println!();
    }

    let status = dispatched
        .handle
        .join()
        .map_err(|_| anyhow::anyhow!("benchmark job thread panicked"))?;

    let report = job.get_results(config.benchmark.default_result_limit);
    println!("{}", output::render_report(&report, config.output.format)?);

    if let Some(path) = &cli.json_output {
        output::json::write_json_file(path, &report)?;
        tracing::info!(path = %path.display(), "JSON report written");
    }

    Ok(match status {
        fetchpulse::JobStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

/// Run the node service until interrupted
fn run_service(config: Config) -> Result<ExitCode> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let hosts = Arc::new(
            HostRegistry::from_records(config.hosts.iter().cloned())
                .context("Invalid [[hosts]] configuration")?,
        );
        let jobs = Arc::new(JobRegistry::new(
            config.service.host_label(),
            Arc::new(CurlFetcher::new(config.benchmark.curl_settings())),
            config.benchmark.job_settings(),
        ));
        let batches = Arc::new(BatchCoordinator::new(
            hosts.clone(),
            Arc::new(TcpPeerClient::new(config.peers.peer_settings())),
            config.peers.read_mode,
        ));
        let state = Arc::new(
            ServiceState::new(jobs, hosts, batches)
                .with_default_result_limit(config.benchmark.default_result_limit),
        );

        let service = NodeService::bind(&config.service.listen_addr(), state).await?;

        println!("FetchPulse v{}", env!("CARGO_PKG_VERSION"));
        println!("Node service listening on {}", service.local_addr()?);
        println!("{}", config);
        println!();

        tokio::select! {
            result = service.run() => result?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
            }
        }

        Ok(ExitCode::SUCCESS)
    })
}

/// Send one request to a node service and print the reply
fn run_control(cli: Cli, config: Config) -> Result<ExitCode> {
    let request = cli
        .request
        .context("control mode requires a request")?
        .into_message();

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let client = TcpPeerClient::new(config.peers.peer_settings());

    let reply = runtime
        .block_on(client.request(&cli.server, &request))
        .with_context(|| format!("Request '{}' to {} failed", request.name(), cli.server))?;

    println!("{}", output::render_reply(&reply, config.output.format)?);

    Ok(match reply {
        Message::Error(_) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}
