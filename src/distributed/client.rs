//! Peer client
//!
//! Outbound calls to other node services. The batch coordinator talks to peers
//! only through the [`PeerClient`] trait, so tests can swap the TCP transport
//! for an in-memory fake.
//!
//! # Timeouts and retries
//!
//! Every exchange (connect, write, read) is bounded by the request timeout.
//! Failed attempts are retried up to `retries` times with a fixed backoff,
//! with one restriction: job creation is only retried when the connection
//! could not be established, since a request that reached the peer may already
//! have created a job there.

use super::protocol::{
    read_message, write_message, CreateJobMessage, ErrorKind, ErrorMessage, Message,
};
use crate::job::{JobId, JobReport, JobRequest};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

/// Outbound call failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    /// Could not complete the exchange (connect, I/O, timeout, framing)
    #[error("{address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    /// Peer answered with an error reply
    #[error("rejected ({kind}): {message}")]
    Rejected { kind: ErrorKind, message: String },

    /// Peer answered with the wrong message type
    #[error("unexpected reply '{got}' (expected '{expected}')")]
    UnexpectedReply { expected: &'static str, got: &'static str },
}

/// Remote job operations used by the batch coordinator
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Create a benchmark job on `address`; returns the remote job id
    async fn create_job(&self, address: &str, request: &JobRequest) -> Result<JobId, PeerError>;

    /// Fetch the result snapshot of a job on `address`
    async fn get_job(&self, address: &str, job_id: JobId, limit: usize) -> Result<JobReport, PeerError>;
}

/// Timeout and retry policy for outbound calls
#[derive(Debug, Clone)]
pub struct PeerSettings {
    pub request_timeout: Duration,
    /// Extra attempts after the first
    pub retries: u32,
    pub retry_backoff: Duration,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retries: 2,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Where an attempt failed
enum Failure {
    /// Nothing reached the peer
    Connect(String),
    /// The request may have reached the peer
    Exchange(String),
}

impl Failure {
    fn reason(self) -> String {
        match self {
            Failure::Connect(r) | Failure::Exchange(r) => r,
        }
    }
}

/// TCP transport speaking the framed peer protocol
#[derive(Debug, Clone, Default)]
pub struct TcpPeerClient {
    settings: PeerSettings,
}

impl TcpPeerClient {
    pub fn new(settings: PeerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PeerSettings {
        &self.settings
    }

    /// Send one request and return the raw reply
    ///
    /// Error replies are returned as `Message::Error`, not as `Err`. Retries
    /// only connection failures.
    pub async fn request(&self, address: &str, msg: &Message) -> Result<Message, PeerError> {
        self.send(address, msg, false).await
    }

    async fn send(&self, address: &str, msg: &Message, retry_after_send: bool) -> Result<Message, PeerError> {
        let mut attempt = 0;
        loop {
            let failure = match self.attempt(address, msg).await {
                Ok(reply) => return Ok(reply),
                Err(failure) => failure,
            };

            let retryable = retry_after_send || matches!(failure, Failure::Connect(_));
            let reason = failure.reason();

            if !retryable || attempt >= self.settings.retries {
                return Err(PeerError::Unreachable {
                    address: address.to_string(),
                    reason,
                });
            }

            attempt += 1;
            tracing::debug!(
                host = %address,
                request = msg.name(),
                attempt,
                %reason,
                "peer call failed, retrying"
            );
            tokio::time::sleep(self.settings.retry_backoff).await;
        }
    }

    async fn attempt(&self, address: &str, msg: &Message) -> Result<Message, Failure> {
        let timeout = self.settings.request_timeout;

        let mut stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Failure::Connect(e.to_string())),
            Err(_) => return Err(Failure::Connect(format!("connect timed out after {:?}", timeout))),
        };

        let exchange = async {
            write_message(&mut stream, msg).await?;
            read_message(&mut stream)
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed before reply"))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(Failure::Exchange(format!("{:#}", e))),
            Err(_) => Err(Failure::Exchange(format!("no reply within {:?}", timeout))),
        }
    }
}

fn rejected(error: ErrorMessage) -> PeerError {
    PeerError::Rejected {
        kind: error.kind,
        message: error.error,
    }
}

#[async_trait]
impl PeerClient for TcpPeerClient {
    async fn create_job(&self, address: &str, request: &JobRequest) -> Result<JobId, PeerError> {
        let msg = Message::CreateJob(CreateJobMessage::new(request.clone()));
        match self.send(address, &msg, false).await? {
            Message::JobAccepted(accepted) => Ok(accepted.job_id),
            Message::Error(error) => Err(rejected(error)),
            other => Err(PeerError::UnexpectedReply {
                expected: "job_accepted",
                got: other.name(),
            }),
        }
    }

    async fn get_job(&self, address: &str, job_id: JobId, limit: usize) -> Result<JobReport, PeerError> {
        let msg = Message::GetJob {
            job_id,
            limit: Some(limit),
        };
        match self.send(address, &msg, true).await? {
            Message::JobResults(report) => Ok(report),
            Message::Error(error) => Err(rejected(error)),
            other => Err(PeerError::UnexpectedReply {
                expected: "job_results",
                got: other.name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn quick() -> TcpPeerClient {
        TcpPeerClient::new(PeerSettings {
            request_timeout: Duration::from_millis(500),
            retries: 2,
            retry_backoff: Duration::from_millis(10),
        })
    }

    /// Free port with nothing listening on it
    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn test_unreachable_after_retries() {
        let addr = closed_port().await;
        let err = quick()
            .create_job(&addr, &JobRequest::new("http://img.example/a.png", Some(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, PeerError::Unreachable { ref address, .. } if *address == addr));
    }

    #[tokio::test]
    async fn test_error_reply_is_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_message(&mut stream).await.unwrap();
            let reply = Message::Error(ErrorMessage::new(ErrorKind::AtCapacity, "busy"));
            write_message(&mut stream, &reply).await.unwrap();
        });

        let err = quick()
            .create_job(&addr, &JobRequest::new("http://img.example/a.png", Some(1)))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PeerError::Rejected {
                kind: ErrorKind::AtCapacity,
                message: "busy".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_create_not_retried_after_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let mut accepted = 0;
            // Read the request then hang up without replying
            while let Ok(Ok((mut stream, _))) =
                tokio::time::timeout(Duration::from_millis(300), listener.accept()).await
            {
                accepted += 1;
                let _ = read_message(&mut stream).await;
            }
            accepted
        });

        let err = quick()
            .create_job(&addr, &JobRequest::new("http://img.example/a.png", Some(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Unreachable { .. }));
        assert_eq!(server.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_job_retried_after_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let mut accepted = 0;
            while let Ok(Ok((mut stream, _))) =
                tokio::time::timeout(Duration::from_millis(300), listener.accept()).await
            {
                accepted += 1;
                let _ = read_message(&mut stream).await;
            }
            accepted
        });

        let err = quick().get_job(&addr, 1, 10).await.unwrap_err();
        assert!(matches!(err, PeerError::Unreachable { .. }));
        assert_eq!(server.await.unwrap(), 3);
    }
}
