//! Benchmark jobs
//!
//! A benchmark job runs a fixed number of trials against one URL, strictly one
//! after another, then evaluates them exactly once and settles on a terminal
//! status.
//!
//! # Lifecycle
//!
//! ```text
//!            execute()             evaluate (once)
//! pending ──────────────► trials ─────────────────► completed
//!                                                 ├► error
//!                                                 └► partial_error
//! ```
//!
//! Records are created by [`JobRegistry`], which also owns id assignment,
//! admission control and dispatch onto a background thread.

pub mod registry;

pub use registry::{DispatchedJob, JobRegistry, JobSettings};

use crate::fetch::Fetcher;
use crate::stats::{DurationSummary, Evaluation, StatsError, SuccessEvaluation};
use crate::trial::Trial;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Job identifier
pub type JobId = u64;

/// Iterations used when a request leaves the count unset
pub const DEFAULT_ITERATIONS: u32 = 50;

/// Largest iteration count a single job accepts
pub const MAX_ITERATIONS: u32 = 100_000;

/// Trials returned by a result snapshot when no limit is given
pub const DEFAULT_RESULT_LIMIT: usize = 50;

/// Job creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// URL of the image to retrieve
    pub target_url: String,
    /// Number of trials; the host's default applies when unset
    #[serde(default)]
    pub iteration_count: Option<u32>,
}

impl JobRequest {
    pub fn new(target_url: impl Into<String>, iteration_count: Option<u32>) -> Self {
        Self {
            target_url: target_url.into(),
            iteration_count,
        }
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Error,
    PartialError,
}

impl JobStatus {
    /// Terminal status for a finished job's counts
    ///
    /// `(0, 0)` cannot happen for a job with at least one trial; it maps to
    /// `Error` since there is no successful trial either way.
    pub fn from_counts(completed_count: u32, failed_count: u32) -> JobStatus {
        match (completed_count > 0, failed_count > 0) {
            (true, false) => JobStatus::Completed,
            (true, true) => JobStatus::PartialError,
            (false, _) => JobStatus::Error,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != JobStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::PartialError => "partial_error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("iteration_count must be between 1 and {}", MAX_ITERATIONS)]
    InvalidIterationCount,

    #[error("invalid target URL '{url}': {reason}")]
    InvalidTargetUrl { url: String, reason: String },

    /// Jobs cannot be modified or deleted once dispatched
    #[error("job {0} is immutable once dispatched")]
    Immutable(JobId),

    #[error("too many active jobs (limit {limit})")]
    AtCapacity { limit: usize },

    #[error("failed to dispatch job: {0}")]
    Dispatch(String),
}

/// Result snapshot of a job
///
/// While the job is pending, `success_evaluation` and `metrics` are `None` and
/// `trials` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub id: JobId,
    pub host_label: String,
    pub target_url: String,
    pub iteration_count: u32,
    pub status: JobStatus,
    pub success_evaluation: Option<SuccessEvaluation>,
    pub metrics: Option<DurationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StatsError>,
    pub trials: Vec<Trial>,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    trials: Vec<Trial>,
    evaluation: Option<Evaluation>,
}

/// Benchmark job record
#[derive(Debug)]
pub struct BenchmarkJob {
    id: JobId,
    host_label: String,
    target_url: String,
    iteration_count: u32,
    started: AtomicBool,
    state: Mutex<JobState>,
    finished: Condvar,
}

impl BenchmarkJob {
    /// Create a pending record; nothing runs until [`execute`](Self::execute)
    pub(crate) fn new(
        id: JobId,
        host_label: impl Into<String>,
        target_url: impl Into<String>,
        iteration_count: u32,
    ) -> Self {
        Self {
            id,
            host_label: host_label.into(),
            target_url: target_url.into(),
            iteration_count,
            started: AtomicBool::new(false),
            state: Mutex::new(JobState {
                status: JobStatus::Pending,
                trials: Vec::with_capacity(iteration_count.min(1024) as usize),
                evaluation: None,
            }),
            finished: Condvar::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn host_label(&self) -> &str {
        &self.host_label
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    /// Trials finished so far, including while pending
    ///
    /// Progress only; snapshots never expose pending trials.
    pub fn trials_recorded(&self) -> usize {
        self.lock().trials.len()
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run every trial in order, then evaluate
    ///
    /// Trial k+1 starts only after trial k returned. Runs at most once; a
    /// second call returns the current status without fetching.
    pub(crate) fn execute(&self, fetcher: &dyn Fetcher) -> JobStatus {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.status();
        }

        for _ in 0..self.iteration_count {
            let trial = Trial::run(fetcher, &self.target_url);
            self.lock().trials.push(trial);
        }

        self.evaluate()
    }

    fn evaluate(&self) -> JobStatus {
        let status = {
            let mut state = self.lock();
            let evaluation = Evaluation::from_trials(&state.trials, self.iteration_count);
            let status = JobStatus::from_counts(
                evaluation.success.completed_count,
                evaluation.success.failed_count,
            );
            state.evaluation = Some(evaluation);
            state.status = status;
            status
        };

        self.finished.notify_all();
        status
    }

    /// Block until the job is terminal or `timeout` elapses
    ///
    /// Returns `true` if the job is terminal.
    pub fn wait_for_completion(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .finished
            .wait_timeout_while(state, timeout, |s| !s.status.is_terminal())
            .unwrap_or_else(PoisonError::into_inner);
        state.status.is_terminal()
    }

    /// Result snapshot with at most `limit` trials
    ///
    /// Pending jobs report no trials and no aggregates regardless of progress.
    /// Terminal jobs report the first `limit` trials in issue order.
    pub fn get_results(&self, limit: usize) -> JobReport {
        let state = self.lock();

        let (success_evaluation, metrics, condition, trials) = match state.evaluation {
            Some(ref evaluation) if state.status.is_terminal() => (
                Some(evaluation.success),
                evaluation.metrics(),
                evaluation.condition(),
                state.trials.iter().take(limit).cloned().collect(),
            ),
            _ => (None, None, None, Vec::new()),
        };

        JobReport {
            id: self.id,
            host_label: self.host_label.clone(),
            target_url: self.target_url.clone(),
            iteration_count: self.iteration_count,
            status: state.status,
            success_evaluation,
            metrics,
            condition,
            trials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::{MockFetcher, MockOutcome};

    const URL: &str = "http://img.example/logo.png";

    #[test]
    fn test_status_from_counts() {
        assert_eq!(JobStatus::from_counts(5, 0), JobStatus::Completed);
        assert_eq!(JobStatus::from_counts(0, 5), JobStatus::Error);
        assert_eq!(JobStatus::from_counts(3, 2), JobStatus::PartialError);
        assert_eq!(JobStatus::from_counts(1, 0), JobStatus::Completed);
        assert_eq!(JobStatus::from_counts(0, 1), JobStatus::Error);
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = BenchmarkJob::new(1, "node-a", URL, 3);
        assert_eq!(job.status(), JobStatus::Pending);

        let report = job.get_results(DEFAULT_RESULT_LIMIT);
        assert!(report.trials.is_empty());
        assert!(report.success_evaluation.is_none());
        assert!(report.metrics.is_none());
        assert!(report.condition.is_none());
    }

    #[test]
    fn test_execute_all_success() {
        let fetcher = MockFetcher::new();
        let job = BenchmarkJob::new(1, "node-a", URL, 5);

        assert_eq!(job.execute(&fetcher), JobStatus::Completed);

        let report = job.get_results(DEFAULT_RESULT_LIMIT);
        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.trials.len(), 5);
        let eval = report.success_evaluation.unwrap();
        assert_eq!(eval.completed_count, 5);
        assert_eq!(eval.failed_count, 0);
        assert_eq!(eval.error_rate, 0.0);
        assert!(report.metrics.is_some());
    }

    #[test]
    fn test_execute_all_failures() {
        let fetcher = MockFetcher::new();
        fetcher.set_default_outcome(MockOutcome::Http(500));
        let job = BenchmarkJob::new(1, "node-a", URL, 5);

        assert_eq!(job.execute(&fetcher), JobStatus::Error);

        let report = job.get_results(DEFAULT_RESULT_LIMIT);
        assert_eq!(report.trials.len(), 5);
        assert!(report.metrics.is_none());
        assert_eq!(report.condition, Some(StatsError::NoSuccessfulTrials));
        assert_eq!(report.success_evaluation.unwrap().error_rate, 1.0);
    }

    #[test]
    fn test_execute_mixed() {
        let fetcher = MockFetcher::scripted([
            MockOutcome::Success(10),
            MockOutcome::Http(404),
            MockOutcome::Success(10),
            MockOutcome::Transport("reset".into()),
        ]);
        let job = BenchmarkJob::new(1, "node-a", URL, 4);

        assert_eq!(job.execute(&fetcher), JobStatus::PartialError);

        let report = job.get_results(DEFAULT_RESULT_LIMIT);
        let eval = report.success_evaluation.unwrap();
        assert_eq!(eval.completed_count + eval.failed_count, 4);
        assert_eq!(eval.error_rate, eval.failed_count as f64 / 4.0);
    }

    #[test]
    fn test_single_trial_success_has_zero_stdev() {
        let fetcher = MockFetcher::new();
        let job = BenchmarkJob::new(1, "node-a", URL, 1);

        assert_eq!(job.execute(&fetcher), JobStatus::Completed);
        let metrics = job.get_results(1).metrics.unwrap();
        assert_eq!(metrics.stdev_duration, Duration::ZERO);
    }

    #[test]
    fn test_single_trial_failure_is_no_successful_trials() {
        let fetcher = MockFetcher::scripted([MockOutcome::Http(503)]);
        let job = BenchmarkJob::new(1, "node-a", URL, 1);

        assert_eq!(job.execute(&fetcher), JobStatus::Error);
        assert_eq!(job.get_results(1).condition, Some(StatsError::NoSuccessfulTrials));
    }

    #[test]
    fn test_trials_run_sequentially() {
        let fetcher = MockFetcher::new();
        fetcher.set_delay(Duration::from_millis(2));
        let job = BenchmarkJob::new(1, "node-a", URL, 10);

        job.execute(&fetcher);
        assert_eq!(fetcher.peak_in_flight(), 1);
        assert_eq!(fetcher.call_count(), 10);
    }

    #[test]
    fn test_result_limit() {
        let fetcher = MockFetcher::scripted([MockOutcome::Http(404)]);
        let job = BenchmarkJob::new(1, "node-a", URL, 5);
        job.execute(&fetcher);

        let limited = job.get_results(2);
        assert_eq!(limited.trials.len(), 2);
        // First trial in issue order is the scripted failure
        assert!(!limited.trials[0].is_success());

        assert_eq!(job.get_results(100).trials.len(), 5);
        assert!(job.get_results(0).trials.is_empty());
        assert!(job.get_results(0).success_evaluation.is_some());
    }

    #[test]
    fn test_execute_runs_once() {
        let fetcher = MockFetcher::new();
        let job = BenchmarkJob::new(1, "node-a", URL, 3);

        job.execute(&fetcher);
        job.execute(&fetcher);

        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(job.get_results(10).trials.len(), 3);
    }

    #[test]
    fn test_wait_for_completion_times_out_while_pending() {
        let job = BenchmarkJob::new(1, "node-a", URL, 3);
        assert!(!job.wait_for_completion(Duration::from_millis(10)));
    }

    #[test]
    fn test_report_json_shape() {
        let fetcher = MockFetcher::new();
        let job = BenchmarkJob::new(7, "node-a", URL, 2);
        job.execute(&fetcher);

        let value = serde_json::to_value(job.get_results(10)).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["host_label"], "node-a");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["success_evaluation"]["completed_count"], 2);
        assert!(value["metrics"]["stdev_duration"].is_number());
        assert!(value.get("condition").is_none());
        assert_eq!(value["trials"].as_array().unwrap().len(), 2);
    }
}
