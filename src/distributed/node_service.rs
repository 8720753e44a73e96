//! Node service
//!
//! TCP server that runs on every benchmark host. The node service:
//! - Creates and dispatches local benchmark jobs, and serves their snapshots
//! - Rejects every attempt to modify or delete a job
//! - Maintains the host registry (register, get, update, remove, list)
//! - Fans batches out to the registered hosts and merges their results
//!
//! Each connection is served on its own task and may carry any number of
//! request/reply pairs. Trials never run on the async runtime; job execution
//! lives on dedicated threads owned by the [`JobRegistry`].

use super::coordinator::BatchCoordinator;
use super::protocol::{
    read_message, serialize_message, ErrorKind, ErrorMessage, JobAcceptedMessage, Message,
    StatusMessage, PROTOCOL_VERSION,
};
use crate::job::{JobRegistry, DEFAULT_RESULT_LIMIT};
use crate::registry::HostRegistry;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

/// Pause after a failed `accept` before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Everything a request can touch
pub struct ServiceState {
    /// Machine hostname, reported by the status probe
    pub hostname: String,
    pub jobs: Arc<JobRegistry>,
    pub hosts: Arc<HostRegistry>,
    pub batches: Arc<BatchCoordinator>,
    /// Snapshot size when a request gives no limit
    pub default_result_limit: usize,
}

impl ServiceState {
    pub fn new(jobs: Arc<JobRegistry>, hosts: Arc<HostRegistry>, batches: Arc<BatchCoordinator>) -> Self {
        Self {
            hostname: get_node_id(),
            jobs,
            hosts,
            batches,
            default_result_limit: DEFAULT_RESULT_LIMIT,
        }
    }

    pub fn with_default_result_limit(mut self, limit: usize) -> Self {
        self.default_result_limit = limit;
        self
    }

    /// Answer one request
    pub async fn handle(&self, msg: Message) -> Message {
        match msg {
            Message::Status => Message::StatusReply(StatusMessage {
                status: "active".to_string(),
                hostname: self.hostname.clone(),
                host_label: self.jobs.host_label().to_string(),
                protocol_version: PROTOCOL_VERSION,
                active_jobs: self.jobs.active_jobs(),
            }),

            Message::CreateJob(create) => {
                if create.protocol_version != PROTOCOL_VERSION {
                    return ErrorMessage::new(
                        ErrorKind::ProtocolMismatch,
                        format!(
                            "Protocol version mismatch: expected {}, got {}",
                            PROTOCOL_VERSION, create.protocol_version
                        ),
                    )
                    .into();
                }
                // The join handle is dropped; the job thread runs detached
                match self.jobs.create(&create.request) {
                    Ok(dispatched) => Message::JobAccepted(JobAcceptedMessage {
                        job_id: dispatched.job.id(),
                        host_label: self.jobs.host_label().to_string(),
                    }),
                    Err(e) => e.into(),
                }
            }

            Message::GetJob { job_id, limit } => {
                let limit = limit.unwrap_or(self.default_result_limit);
                match self.jobs.report(job_id, limit) {
                    Ok(report) => Message::JobResults(report),
                    Err(e) => e.into(),
                }
            }

            Message::UpdateJob { job_id, request } => match self.jobs.update(job_id, &request) {
                Ok(()) => Message::Ack,
                Err(e) => e.into(),
            },

            Message::DeleteJob { job_id } => match self.jobs.delete(job_id) {
                Ok(()) => Message::Ack,
                Err(e) => e.into(),
            },

            Message::RegisterHost(record) => match self.hosts.register(record) {
                Ok(()) => Message::Ack,
                Err(e) => e.into(),
            },

            Message::GetHost { label } => match self.hosts.get(&label) {
                Ok(record) => Message::Host(record),
                Err(e) => e.into(),
            },

            Message::UpdateHost(record) => match self.hosts.update(record) {
                Ok(()) => Message::Ack,
                Err(e) => e.into(),
            },

            Message::RemoveHost { label } => match self.hosts.remove(&label) {
                Ok(record) => Message::Host(record),
                Err(e) => e.into(),
            },

            Message::ListHosts => Message::Hosts(self.hosts.snapshot()),

            Message::CreateBatch(request) => match self.batches.create_batch(&request).await {
                Ok(created) => Message::BatchCreated(created),
                Err(e) => e.into(),
            },

            Message::GetBatch { batch_id, limit } => {
                let limit = limit.unwrap_or(self.default_result_limit);
                match self.batches.get_batch(batch_id, limit).await {
                    Ok(results) => Message::BatchResults(results),
                    Err(e) => e.into(),
                }
            }

            reply => ErrorMessage::new(
                ErrorKind::InvalidRequest,
                format!("'{}' is a reply, not a request", reply.name()),
            )
            .into(),
        }
    }
}

/// Node service
pub struct NodeService {
    listener: TcpListener,
    state: Arc<ServiceState>,
}

impl NodeService {
    /// Bind the listening socket
    ///
    /// Port 0 picks an ephemeral port; see [`local_addr`](Self::local_addr).
    pub async fn bind(addr: &str, state: Arc<ServiceState>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind node service on {}", addr))?;

        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read node service address")
    }

    /// Accept connections until the task is dropped
    ///
    /// A failed `accept` (descriptor exhaustion, aborted handshake) is logged
    /// and retried after a short pause.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            address = %self.local_addr()?,
            host_label = %self.state.jobs.host_label(),
            "node service listening"
        );

        loop {
            let (stream, peer) = accept_with_backoff(|| self.listener.accept(), ACCEPT_BACKOFF).await;

            let state = self.state.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, state).await {
                    tracing::warn!(%peer, error = %format!("{:#}", e), "connection closed with error");
                }
            });
        }
    }
}

/// Retry `accept` until it yields a connection, pausing after each failure
async fn accept_with_backoff<F, Fut, T>(mut accept: F, backoff: Duration) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                tracing::warn!(error = %e, "failed to accept connection");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn serve_connection<S>(mut stream: S, state: Arc<ServiceState>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(request) = read_message(&mut stream).await? {
        tracing::debug!(request = request.name(), "request received");
        let reply = state.handle(request).await;
        let framed = frame_reply(&reply)?;
        stream.write_all(&framed).await.context("Failed to write message")?;
        stream.flush().await.context("Failed to flush stream")?;
    }
    Ok(())
}

/// Frame a reply; one that cannot be framed is answered with an error instead
fn frame_reply(reply: &Message) -> Result<Vec<u8>> {
    match serialize_message(reply) {
        Ok(framed) => Ok(framed),
        Err(e) => {
            tracing::warn!(reply = reply.name(), error = %format!("{:#}", e), "reply replaced by error");
            let error = ErrorMessage::new(
                ErrorKind::InvalidRequest,
                format!("{} reply too large, request fewer trials: {:#}", reply.name(), e),
            );
            serialize_message(&error.into())
        }
    }
}

/// Machine hostname, or `"unknown"`
pub fn get_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
