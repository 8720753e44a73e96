//! Job registry
//!
//! Owns every benchmark job created on this host. Creation is split in two:
//!
//! 1. **Admit + record**: validate the request, take an active-job slot,
//!    assign a fresh id from an atomic counter, store the pending record
//! 2. **Dispatch**: hand the record to its own named OS thread, which runs the
//!    trials and releases the slot when the job turns terminal
//!
//! Jobs are never cancelled, updated or removed once dispatched.

use super::{
    BenchmarkJob, JobError, JobId, JobReport, JobRequest, JobStatus, DEFAULT_ITERATIONS, MAX_ITERATIONS,
};
use crate::fetch::Fetcher;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;

/// Default admission limit
pub const DEFAULT_MAX_ACTIVE_JOBS: usize = 64;

/// Registry settings
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Iterations applied when a request leaves them unset
    pub default_iterations: u32,
    /// Jobs allowed to run at once; creation beyond this is rejected
    pub max_active_jobs: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            default_iterations: DEFAULT_ITERATIONS,
            max_active_jobs: DEFAULT_MAX_ACTIVE_JOBS,
        }
    }
}

/// Handle to a freshly dispatched job
#[derive(Debug)]
pub struct DispatchedJob {
    pub job: Arc<BenchmarkJob>,
    /// Joins with the job's terminal status
    pub handle: JoinHandle<JobStatus>,
}

/// Active-job slot, released on drop
struct ActiveSlot(Arc<AtomicUsize>);

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Registry of benchmark jobs on this host
pub struct JobRegistry {
    host_label: String,
    fetcher: Arc<dyn Fetcher>,
    settings: JobSettings,
    next_id: AtomicU64,
    active: Arc<AtomicUsize>,
    jobs: RwLock<HashMap<JobId, Arc<BenchmarkJob>>>,
}

impl JobRegistry {
    /// Create an empty registry; ids start at 1
    pub fn new(host_label: impl Into<String>, fetcher: Arc<dyn Fetcher>, settings: JobSettings) -> Self {
        Self {
            host_label: host_label.into(),
            fetcher,
            settings,
            next_id: AtomicU64::new(1),
            active: Arc::new(AtomicUsize::new(0)),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn host_label(&self) -> &str {
        &self.host_label
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Jobs currently holding an active slot
    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Jobs ever created
    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate, record and dispatch a job
    ///
    /// Returns as soon as the job thread is spawned; trials run in the
    /// background.
    pub fn create(&self, request: &JobRequest) -> Result<DispatchedJob, JobError> {
        let iteration_count = request
            .iteration_count
            .unwrap_or(self.settings.default_iterations);
        validate_request(&request.target_url, iteration_count)?;

        let slot = self.try_admit()?;
        let job = self.record(&request.target_url, iteration_count);

        match self.dispatch(job.clone(), slot) {
            Ok(handle) => {
                tracing::info!(
                    job_id = job.id(),
                    target_url = %job.target_url(),
                    iterations = iteration_count,
                    "benchmark job dispatched"
                );
                Ok(DispatchedJob { job, handle })
            }
            Err(e) => {
                self.jobs
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&job.id());
                Err(e)
            }
        }
    }

    fn try_admit(&self) -> Result<ActiveSlot, JobError> {
        let limit = self.settings.max_active_jobs;
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
            .map(|_| ActiveSlot(self.active.clone()))
            .map_err(|_| {
                tracing::warn!(limit, "job rejected: active job limit reached");
                JobError::AtCapacity { limit }
            })
    }

    fn record(&self, target_url: &str, iteration_count: u32) -> Arc<BenchmarkJob> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let job = Arc::new(BenchmarkJob::new(id, &self.host_label, target_url, iteration_count));
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, job.clone());
        job
    }

    fn dispatch(&self, job: Arc<BenchmarkJob>, slot: ActiveSlot) -> Result<JoinHandle<JobStatus>, JobError> {
        let fetcher = self.fetcher.clone();
        std::thread::Builder::new()
            .name(format!("job-{}", job.id()))
            .spawn(move || {
                let _slot = slot;
                let status = job.execute(fetcher.as_ref());
                tracing::info!(
                    job_id = job.id(),
                    status = %status,
                    trials = job.trials_recorded(),
                    "benchmark job finished"
                );
                status
            })
            .map_err(|e| JobError::Dispatch(e.to_string()))
    }

    /// Look up a job
    pub fn get(&self, id: JobId) -> Result<Arc<BenchmarkJob>, JobError> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound(id))
    }

    /// Result snapshot of a job
    pub fn report(&self, id: JobId, limit: usize) -> Result<JobReport, JobError> {
        Ok(self.get(id)?.get_results(limit))
    }

    /// Modification is never allowed; unknown ids still report not-found
    pub fn update(&self, id: JobId, _request: &JobRequest) -> Result<(), JobError> {
        self.get(id)?;
        Err(JobError::Immutable(id))
    }

    /// Deletion is never allowed; unknown ids still report not-found
    pub fn delete(&self, id: JobId) -> Result<(), JobError> {
        self.get(id)?;
        Err(JobError::Immutable(id))
    }
}

fn validate_request(target_url: &str, iteration_count: u32) -> Result<(), JobError> {
    if iteration_count == 0 || iteration_count > MAX_ITERATIONS {
        return Err(JobError::InvalidIterationCount);
    }

    let parsed = url::Url::parse(target_url).map_err(|e| JobError::InvalidTargetUrl {
        url: target_url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(JobError::InvalidTargetUrl {
            url: target_url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
