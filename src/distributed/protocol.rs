//! Peer protocol
//!
//! Request/reply messages exchanged with a node service, whether the caller is
//! another node's batch coordinator or the control CLI. Messages are encoded
//! with MessagePack (rmp-serde, named fields) so optional fields and renamed
//! enums survive the round trip.
//!
//! # Protocol Version
//!
//! Current version: 1. Job creation carries the caller's version; a node with a
//! different version rejects it with [`ErrorKind::ProtocolMismatch`].
//!
//! # Message Flow
//!
//! Every connection carries any number of request/reply pairs:
//!
//! ```text
//! Caller                           Node service
//!     |                              |
//!     |-------- CREATE_JOB --------->|
//!     |<------- JOB_ACCEPTED --------|
//!     |                              |
//!     |-------- GET_JOB ------------>|
//!     |<------- JOB_RESULTS ---------|
//!     |                              |
//!     |-------- UPDATE_JOB --------->|
//!     |<------- ERROR(forbidden) ----|
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use super::coordinator::{BatchCreated, BatchError, BatchId, BatchResults, FailedHost};
use crate::job::{JobError, JobId, JobReport, JobRequest};
use crate::registry::{HostRecord, RegistryError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted message body
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Liveness probe
    Status,

    /// Create and dispatch a benchmark job on the receiving node
    CreateJob(CreateJobMessage),

    /// Result snapshot of a local job; `limit` falls back to the node default
    GetJob { job_id: JobId, limit: Option<usize> },

    /// Always rejected; jobs are immutable
    UpdateJob { job_id: JobId, request: JobRequest },

    /// Always rejected; jobs are immutable
    DeleteJob { job_id: JobId },

    RegisterHost(HostRecord),
    GetHost { label: String },
    UpdateHost(HostRecord),
    RemoveHost { label: String },
    ListHosts,

    /// Fan a job out to every registered host
    CreateBatch(JobRequest),

    /// Re-query every host of a batch and merge the snapshots
    GetBatch { batch_id: BatchId, limit: Option<usize> },

    /// Reply to `Status`
    StatusReply(StatusMessage),

    /// Reply to `CreateJob`
    JobAccepted(JobAcceptedMessage),

    /// Reply to `GetJob`
    JobResults(JobReport),

    /// Reply to `GetHost`, `RemoveHost`
    Host(HostRecord),

    /// Reply to `ListHosts`
    Hosts(Vec<HostRecord>),

    /// Reply to `RegisterHost`, `UpdateHost`
    Ack,

    /// Reply to `CreateBatch`
    BatchCreated(BatchCreated),

    /// Reply to `GetBatch`
    BatchResults(BatchResults),

    /// Any request failed
    Error(ErrorMessage),
}

impl Message {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Message::Status => "status",
            Message::CreateJob(_) => "create_job",
            Message::GetJob { .. } => "get_job",
            Message::UpdateJob { .. } => "update_job",
            Message::DeleteJob { .. } => "delete_job",
            Message::RegisterHost(_) => "register_host",
            Message::GetHost { .. } => "get_host",
            Message::UpdateHost(_) => "update_host",
            Message::RemoveHost { .. } => "remove_host",
            Message::ListHosts => "list_hosts",
            Message::CreateBatch(_) => "create_batch",
            Message::GetBatch { .. } => "get_batch",
            Message::StatusReply(_) => "status_reply",
            Message::JobAccepted(_) => "job_accepted",
            Message::JobResults(_) => "job_results",
            Message::Host(_) => "host",
            Message::Hosts(_) => "hosts",
            Message::Ack => "ack",
            Message::BatchCreated(_) => "batch_created",
            Message::BatchResults(_) => "batch_results",
            Message::Error(_) => "error",
        }
    }
}

/// Job creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    pub request: JobRequest,
}

impl CreateJobMessage {
    pub fn new(request: JobRequest) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            request,
        }
    }
}

/// Status reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Always `"active"` for a running node
    pub status: String,

    /// Machine hostname of the node
    pub hostname: String,

    /// Host label the node reports in its jobs
    pub host_label: String,

    pub protocol_version: u32,

    /// Jobs currently running on the node
    pub active_jobs: usize,
}

/// Job creation reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAcceptedMessage {
    pub job_id: JobId,
    pub host_label: String,
}

/// Failure cause, so automated clients can branch on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    InvalidRequest,
    AtCapacity,
    NoHosts,
    NoHostAccepted,
    UpstreamUnavailable,
    ProtocolMismatch,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::AtCapacity => "at_capacity",
            ErrorKind::NoHosts => "no_hosts",
            ErrorKind::NoHostAccepted => "no_host_accepted",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::ProtocolMismatch => "protocol_mismatch",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Error reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub kind: ErrorKind,

    /// Error description
    pub error: String,

    /// Hosts that refused a batch, when no host accepted it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_hosts: Vec<FailedHost>,
}

impl ErrorMessage {
    pub fn new(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            failed_hosts: Vec::new(),
        }
    }
}

impl From<JobError> for ErrorMessage {
    fn from(e: JobError) -> Self {
        let kind = match e {
            JobError::NotFound(_) => ErrorKind::NotFound,
            JobError::InvalidIterationCount | JobError::InvalidTargetUrl { .. } => {
                ErrorKind::InvalidRequest
            }
            JobError::Immutable(_) => ErrorKind::Forbidden,
            JobError::AtCapacity { .. } => ErrorKind::AtCapacity,
            JobError::Dispatch(_) => ErrorKind::Internal,
        };
        ErrorMessage::new(kind, e.to_string())
    }
}

impl From<RegistryError> for ErrorMessage {
    fn from(e: RegistryError) -> Self {
        let kind = match e {
            RegistryError::AlreadyRegistered(_) => ErrorKind::Conflict,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
        };
        ErrorMessage::new(kind, e.to_string())
    }
}

impl From<BatchError> for ErrorMessage {
    fn from(e: BatchError) -> Self {
        let kind = match e {
            BatchError::NoHosts => ErrorKind::NoHosts,
            BatchError::NoHostAccepted { .. } => ErrorKind::NoHostAccepted,
            BatchError::NotFound(_) => ErrorKind::NotFound,
            BatchError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
        };
        let error = e.to_string();
        let failed_hosts = match e {
            BatchError::NoHostAccepted { failed_hosts } => failed_hosts,
            _ => Vec::new(),
        };
        ErrorMessage {
            kind,
            error,
            failed_hosts,
        }
    }
}

impl From<ErrorMessage> for Message {
    fn from(e: ErrorMessage) -> Self {
        Message::Error(e)
    }
}

impl From<JobError> for Message {
    fn from(e: JobError) -> Self {
        Message::Error(e.into())
    }
}

impl From<RegistryError> for Message {
    fn from(e: RegistryError) -> Self {
        Message::Error(e.into())
    }
}

impl From<BatchError> for Message {
    fn from(e: BatchError) -> Self {
        Message::Error(e.into())
    }
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing.
///
/// # Message Format
///
/// ```text
/// [4 bytes: message length (little-endian u32)][N bytes: MessagePack message]
/// ```
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec_named(msg).context("Failed to serialize message")?;

    if msg_bytes.len() > MAX_MESSAGE_SIZE {
        anyhow::bail!(
            "Message too large: {} bytes (max {})",
            msg_bytes.len(),
            MAX_MESSAGE_SIZE
        );
    }

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Read a complete message from a stream
///
/// Returns `Ok(None)` if the peer closed the connection before a new message
/// started.
pub async fn read_message<R>(stream: &mut R) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("Failed to read message length"),
    }

    let msg_len = u32::from_le_bytes(len_buf) as usize;

    if msg_len > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} bytes (max {})", msg_len, MAX_MESSAGE_SIZE);
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream
        .read_exact(&mut msg_buf)
        .await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf).context("Failed to deserialize message")?;

    Ok(Some(msg))
}

/// Write a message to a stream
pub async fn write_message<W>(stream: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;

    stream.write_all(&framed).await.context("Failed to write message")?;
    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}
