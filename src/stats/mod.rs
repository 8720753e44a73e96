//! Statistics
//!
//! Aggregation of completed trials into a success evaluation and duration
//! metrics.
//!
//! - **Success evaluation**: completed/failed counts and the error rate over
//!   all issued trials
//! - **Duration metrics**: min, max, mean and sample standard deviation over
//!   successful trials only
//!
//! Duration metrics need at least one successful trial. With none, the
//! evaluation carries [`StatsError::NoSuccessfulTrials`] instead of metrics.
//!
//! # Example
//!
//! ```
//! use fetchpulse::stats::DurationSummary;
//! use std::time::Duration;
//!
//! let samples: Vec<Duration> = [10, 20, 30, 40, 50]
//!     .iter()
//!     .map(|ms| Duration::from_millis(*ms))
//!     .collect();
//!
//! let summary = DurationSummary::from_durations(&samples).unwrap();
//! assert_eq!(summary.min_duration, Duration::from_millis(10));
//! assert_eq!(summary.max_duration, Duration::from_millis(50));
//! assert_eq!(summary.mean_duration, Duration::from_millis(30));
//! ```

use crate::trial::Trial;
use crate::util::time::secs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Degenerate-aggregate conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsError {
    /// No trial succeeded, so there is no duration sample to reduce
    #[error("no successful trials")]
    NoSuccessfulTrials,
}

/// Duration metrics over successful trials
///
/// A single sample has a standard deviation of zero (population of one); the
/// n-1 sample formula applies from two samples up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSummary {
    #[serde(with = "secs")]
    pub min_duration: Duration,
    #[serde(with = "secs")]
    pub max_duration: Duration,
    #[serde(with = "secs")]
    pub mean_duration: Duration,
    #[serde(with = "secs")]
    pub stdev_duration: Duration,
}

impl DurationSummary {
    /// Reduce a set of durations
    ///
    /// Arithmetic runs on nanoseconds as `f64`; mean and deviation are rounded
    /// to the nearest nanosecond.
    pub fn from_durations(durations: &[Duration]) -> Result<Self, StatsError> {
        let min_duration = durations.iter().copied().min().ok_or(StatsError::NoSuccessfulTrials)?;
        let max_duration = durations.iter().copied().max().ok_or(StatsError::NoSuccessfulTrials)?;

        let samples: Vec<f64> = durations.iter().map(|d| d.as_nanos() as f64).collect();
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;

        let stdev = if samples.len() < 2 {
            0.0
        } else {
            let sum_sq: f64 = samples.iter().map(|x| (x - mean).powi(2)).sum();
            (sum_sq / (n - 1.0)).sqrt()
        };

        Ok(Self {
            min_duration,
            max_duration,
            mean_duration: nanos_to_duration(mean),
            stdev_duration: nanos_to_duration(stdev),
        })
    }
}

fn nanos_to_duration(nanos: f64) -> Duration {
    Duration::from_nanos(nanos.round().max(0.0) as u64)
}

/// Success/failure counts for a finished job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuccessEvaluation {
    pub completed_count: u32,
    pub failed_count: u32,
    /// `failed_count / iteration_count`
    pub error_rate: f64,
}

/// Everything computed once a job's trials are all in
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub success: SuccessEvaluation,
    pub metrics: Result<DurationSummary, StatsError>,
}

impl Evaluation {
    /// Evaluate finished trials
    ///
    /// `iteration_count` is the denominator of the error rate; callers pass the
    /// job's fixed trial count, which equals `trials.len()` for a finished job.
    pub fn from_trials(trials: &[Trial], iteration_count: u32) -> Self {
        let (successes, failures): (Vec<&Trial>, Vec<&Trial>) =
            trials.iter().partition(|t| t.is_success());

        let completed_count = successes.len() as u32;
        let failed_count = failures.len() as u32;
        let error_rate = if iteration_count > 0 {
            failed_count as f64 / iteration_count as f64
        } else {
            0.0
        };

        let durations: Vec<Duration> = successes.iter().map(|t| t.duration()).collect();

        Self {
            success: SuccessEvaluation {
                completed_count,
                failed_count,
                error_rate,
            },
            metrics: DurationSummary::from_durations(&durations),
        }
    }

    /// Metrics if any trial succeeded
    pub fn metrics(&self) -> Option<DurationSummary> {
        self.metrics.ok()
    }

    /// Degenerate condition, if any
    pub fn condition(&self) -> Option<StatsError> {
        self.metrics.err()
    }
}
