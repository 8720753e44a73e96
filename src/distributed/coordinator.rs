//! Batch coordinator
//!
//! Fans a benchmark job out to every registered host and later merges the
//! per-host result snapshots into one batch view.
//!
//! # Creation
//!
//! 1. Snapshot the host registry (later edits do not affect this fan-out)
//! 2. Send `CreateJob` to every host concurrently
//! 3. Record one [`Assignment`] per accepting host, in snapshot order
//! 4. Allocate a batch id only if at least one host accepted
//!
//! # Retrieval
//!
//! Reads never use cached results: every assigned host is re-queried live.
//! In [`ReadMode::Strict`] (the default) a single unavailable host fails the
//! whole read with [`BatchError::UpstreamUnavailable`]. [`ReadMode::BestEffort`]
//! returns the reports that arrived plus the list of hosts that did not answer.

use super::client::{PeerClient, PeerError};
use crate::job::{JobId, JobReport, JobRequest};
use crate::registry::{HostRecord, HostRegistry};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Batch identifier
pub type BatchId = u64;

/// Advisory attached to batches created against a single host
pub const SINGLE_HOST_ADVISORY: &str = "only one host registered";

/// A host that accepted the fan-out request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub address: String,
    pub label: String,
    /// Job id on that host
    pub job_id: JobId,
}

/// A host that failed to accept, or failed to answer a read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedHost {
    pub address: String,
    pub label: String,
    pub reason: String,
}

impl FailedHost {
    fn new(host: &HostRecord, error: &PeerError) -> Self {
        Self {
            address: host.address.clone(),
            label: host.label.clone(),
            reason: error.to_string(),
        }
    }
}

/// How batch reads treat unavailable hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Any unavailable host fails the whole read
    #[default]
    Strict,
    /// Return what arrived, plus the unavailable hosts
    BestEffort,
}

impl std::fmt::Display for ReadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadMode::Strict => write!(f, "strict"),
            ReadMode::BestEffort => write!(f, "best_effort"),
        }
    }
}

/// Immutable record of a fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: BatchId,
    pub target_url: String,
    pub created_at: DateTime<Utc>,
    /// Never empty
    pub assignments: Vec<Assignment>,
}

/// Reply to batch creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreated {
    pub batch_id: BatchId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub failed_hosts: Vec<FailedHost>,
}

/// Merged batch read, one report per assignment in assignment order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    pub batch_id: BatchId,
    pub target_url: String,
    pub created_at: DateTime<Utc>,
    /// Semantics this read ran under
    pub read_mode: ReadMode,
    pub reports: Vec<JobReport>,
    /// Only ever non-empty in best-effort mode
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<FailedHost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Registry was empty when the batch was requested
    #[error("no hosts registered")]
    NoHosts,

    /// Every host failed to accept; no batch was created
    #[error("no host accepted the benchmark job ({} failed)", .failed_hosts.len())]
    NoHostAccepted { failed_hosts: Vec<FailedHost> },

    #[error("batch {0} not found")]
    NotFound(BatchId),

    /// A host could not produce its job snapshot during a strict read
    #[error("upstream unavailable: {address}: {reason}")]
    UpstreamUnavailable { address: String, reason: String },
}

/// Batch coordinator
pub struct BatchCoordinator {
    hosts: Arc<HostRegistry>,
    client: Arc<dyn PeerClient>,
    read_mode: ReadMode,
    next_id: AtomicU64,
    batches: RwLock<HashMap<BatchId, Arc<BatchJob>>>,
}

impl BatchCoordinator {
    pub fn new(hosts: Arc<HostRegistry>, client: Arc<dyn PeerClient>, read_mode: ReadMode) -> Self {
        Self {
            hosts,
            client,
            read_mode,
            next_id: AtomicU64::new(1),
            batches: RwLock::new(HashMap::new()),
        }
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    /// Fan `request` out to every registered host
    pub async fn create_batch(&self, request: &JobRequest) -> Result<BatchCreated, BatchError> {
        let hosts = self.hosts.snapshot();
        if hosts.is_empty() {
            tracing::warn!("batch rejected: no hosts registered");
            return Err(BatchError::NoHosts);
        }

        let advisory = (hosts.len() == 1).then(|| SINGLE_HOST_ADVISORY.to_string());

        let outcomes = join_all(
            hosts
                .iter()
                .map(|host| self.client.create_job(&host.address, request)),
        )
        .await;

        let mut assignments = Vec::new();
        let mut failed_hosts = Vec::new();
        for (host, outcome) in hosts.iter().zip(outcomes) {
            match outcome {
                Ok(job_id) => {
                    tracing::debug!(host = %host.label, job_id, "host accepted benchmark job");
                    assignments.push(Assignment {
                        address: host.address.clone(),
                        label: host.label.clone(),
                        job_id,
                    });
                }
                Err(e) => {
                    tracing::warn!(host = %host.label, error = %e, "host failed to accept benchmark job");
                    failed_hosts.push(FailedHost::new(host, &e));
                }
            }
        }

        if assignments.is_empty() {
            return Err(BatchError::NoHostAccepted { failed_hosts });
        }

        let batch_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let batch = BatchJob {
            id: batch_id,
            target_url: request.target_url.clone(),
            created_at: Utc::now(),
            assignments: assignments.clone(),
        };
        self.batches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(batch_id, Arc::new(batch));

        tracing::info!(
            batch_id,
            accepted = assignments.len(),
            failed = failed_hosts.len(),
            "batch created"
        );

        Ok(BatchCreated {
            batch_id,
            advisory,
            assignments,
            failed_hosts,
        })
    }

    /// Look up a batch record
    pub fn batch(&self, batch_id: BatchId) -> Result<Arc<BatchJob>, BatchError> {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&batch_id)
            .cloned()
            .ok_or(BatchError::NotFound(batch_id))
    }

    /// Re-query every assigned host and merge the snapshots
    pub async fn get_batch(&self, batch_id: BatchId, limit: usize) -> Result<BatchResults, BatchError> {
        let batch = self.batch(batch_id)?;

        let outcomes = join_all(
            batch
                .assignments
                .iter()
                .map(|a| self.client.get_job(&a.address, a.job_id, limit)),
        )
        .await;

        let mut reports = Vec::with_capacity(outcomes.len());
        let mut unavailable = Vec::new();
        for (assignment, outcome) in batch.assignments.iter().zip(outcomes) {
            match outcome {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::warn!(
                        batch_id,
                        host = %assignment.label,
                        job_id = assignment.job_id,
                        error = %e,
                        "batch read: host unavailable"
                    );
                    if self.read_mode() == ReadMode::Strict {
                        return Err(BatchError::UpstreamUnavailable {
                            address: assignment.address.clone(),
                            reason: e.to_string(),
                        });
                    }
                    unavailable.push(FailedHost {
                        address: assignment.address.clone(),
                        label: assignment.label.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(BatchResults {
            batch_id,
            target_url: batch.target_url.clone(),
            created_at: batch.created_at,
            read_mode: self.read_mode(),
            reports,
            unavailable,
        })
    }
}
