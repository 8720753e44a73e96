//! Trials
//!
//! A trial is one timed retrieval attempt. It starts as a [`PendingTrial`] and
//! is consumed into a completed [`Trial`] exactly once, so the outcome cannot
//! change after the fetch returns.

use crate::fetch::{FetchError, FetchReceipt, Fetcher};
use crate::util::time::secs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Trial outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    /// Fetch in progress
    Pending,
    /// Fetch completed without a fetch-layer error
    Success,
    /// Fetch failed (non-2xx, transport error, timeout)
    Failure,
}

/// A trial whose fetch has not returned yet
#[derive(Debug)]
pub struct PendingTrial {
    target_url: String,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl PendingTrial {
    /// Record the start of an attempt
    pub fn start(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Always [`TrialOutcome::Pending`]
    pub fn outcome(&self) -> TrialOutcome {
        TrialOutcome::Pending
    }

    /// Classify the fetch result and freeze the trial
    ///
    /// Duration comes from the monotonic clock; `ended_at` is derived from it
    /// so `ended_at - started_at == duration` always holds.
    pub fn finish(self, result: Result<FetchReceipt, FetchError>) -> Trial {
        let duration = self.started.elapsed();
        let (outcome, error) = match result {
            Ok(_) => (TrialOutcome::Success, None),
            Err(e) => (TrialOutcome::Failure, Some(e.to_string())),
        };
        Trial::from_parts(self.target_url, outcome, self.started_at, duration, error)
    }
}

/// A completed trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    outcome: TrialOutcome,
    target_url: String,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    #[serde(with = "secs")]
    duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Trial {
    /// Perform one attempt against `target_url`
    ///
    /// Fetch failures are absorbed into the trial's outcome.
    pub fn run(fetcher: &dyn Fetcher, target_url: &str) -> Trial {
        let pending = PendingTrial::start(target_url);
        let result = fetcher.fetch(target_url);
        pending.finish(result)
    }

    /// Build a trial from known values
    ///
    /// Used when timings come from elsewhere (statistics tests, replayed
    /// reports).
    pub fn from_parts(
        target_url: impl Into<String>,
        outcome: TrialOutcome,
        started_at: DateTime<Utc>,
        duration: Duration,
        error: Option<String>,
    ) -> Trial {
        let ended_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| started_at.checked_add_signed(d))
            .unwrap_or(started_at);

        Trial {
            outcome,
            target_url: target_url.into(),
            started_at,
            ended_at,
            duration,
            error,
        }
    }

    pub fn outcome(&self) -> TrialOutcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome == TrialOutcome::Success
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Failure reason, if the trial failed
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
