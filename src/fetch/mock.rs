//! Mock fetcher for testing
//!
//! Simulates retrievals without touching the network, making job and service
//! tests fast and deterministic.
//!
//! # Features
//!
//! - Scripted per-call outcomes (FIFO), with a configurable default
//! - Simulated latency
//! - Permit gate to hold calls mid-job
//! - Records every fetched URL and the peak number of concurrent calls
//!
//! # Example
//!
//! ```
//! use fetchpulse::fetch::Fetcher;
//! use fetchpulse::fetch::mock::{MockFetcher, MockOutcome};
//!
//! let fetcher = MockFetcher::new();
//! fetcher.set_default_outcome(MockOutcome::Transport("connection reset".into()));
//!
//! assert!(fetcher.fetch("http://cdn.example/logo.png").is_err());
//! assert_eq!(fetcher.fetched_urls(), vec!["http://cdn.example/logo.png".to_string()]);
//! ```

use super::{FetchError, FetchReceipt, Fetcher};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Outcome of one mock retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// 200 with the given body size
    Success(u64),
    /// Non-2xx status
    Http(u32),
    /// Transport failure
    Transport(String),
}

impl MockOutcome {
    fn into_result(self) -> Result<FetchReceipt, FetchError> {
        match self {
            MockOutcome::Success(bytes) => Ok(FetchReceipt {
                bytes,
                http_status: 200,
            }),
            MockOutcome::Http(code) => Err(FetchError::Http(code)),
            MockOutcome::Transport(reason) => Err(FetchError::Transport(reason)),
        }
    }
}

/// Permit gate; `None` means unlimited
#[derive(Debug, Default)]
struct Gate {
    permits: Mutex<Option<usize>>,
    changed: Condvar,
}

/// Mock fetcher
///
/// Cloning shares all state, so a test can keep a handle while a job owns
/// another.
#[derive(Debug, Clone)]
pub struct MockFetcher {
    /// Outcomes consumed in order before falling back to the default
    script: Arc<Mutex<VecDeque<MockOutcome>>>,

    /// Outcome used once the script is exhausted
    default_outcome: Arc<Mutex<MockOutcome>>,

    /// Simulated latency per call
    delay: Arc<Mutex<Duration>>,

    /// Calls block here when permits are limited
    gate: Arc<Gate>,

    /// Every URL fetched, in call order
    fetched: Arc<Mutex<Vec<String>>>,

    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockFetcher {
    /// Create a mock that succeeds every call instantly with a 1 KiB body
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            default_outcome: Arc::new(Mutex::new(MockOutcome::Success(1024))),
            delay: Arc::new(Mutex::new(Duration::ZERO)),
            gate: Arc::new(Gate::default()),
            fetched: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock whose first calls follow `outcomes`
    pub fn scripted(outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        let fetcher = Self::new();
        lock(&fetcher.script).extend(outcomes);
        fetcher
    }

    /// Append one outcome to the script
    pub fn push_outcome(&self, outcome: MockOutcome) {
        lock(&self.script).push_back(outcome);
    }

    /// Set the outcome used once the script runs out
    pub fn set_default_outcome(&self, outcome: MockOutcome) {
        *lock(&self.default_outcome) = outcome;
    }

    /// Set simulated latency per call
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = delay;
    }

    /// Limit how many further calls may proceed; the rest block until released
    pub fn hold_after(&self, permits: usize) {
        *lock(&self.gate.permits) = Some(permits);
        self.gate.changed.notify_all();
    }

    /// Allow `count` more blocked calls through
    pub fn release(&self, count: usize) {
        let mut permits = lock(&self.gate.permits);
        if let Some(ref mut remaining) = *permits {
            *remaining += count;
        }
        self.gate.changed.notify_all();
    }

    /// Remove the permit limit entirely
    pub fn release_all(&self) {
        *lock(&self.gate.permits) = None;
        self.gate.changed.notify_all();
    }

    /// URLs fetched so far, in call order
    pub fn fetched_urls(&self) -> Vec<String> {
        lock(&self.fetched).clone()
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        lock(&self.fetched).len()
    }

    /// Highest number of calls that were ever in progress at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn wait_for_permit(&self) {
        let mut permits = lock(&self.gate.permits);
        loop {
            match permits.as_mut() {
                None => return,
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    return;
                }
                Some(_) => {}
            }
            permits = self
                .gate
                .changed
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<FetchReceipt, FetchError> {
        self.wait_for_permit();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let outcome = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| lock(&self.default_outcome).clone());
        lock(&self.fetched).push(url.to_string());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_succeeds() {
        let fetcher = MockFetcher::new();
        let receipt = fetcher.fetch("http://a/b.png").unwrap();
        assert_eq!(receipt.http_status, 200);
        assert_eq!(receipt.bytes, 1024);
    }

    #[test]
    fn test_script_then_default() {
        let fetcher = MockFetcher::scripted([
            MockOutcome::Http(503),
            MockOutcome::Transport("reset".to_string()),
        ]);

        assert_eq!(fetcher.fetch("u").unwrap_err(), FetchError::Http(503));
        assert_eq!(
            fetcher.fetch("u").unwrap_err(),
            FetchError::Transport("reset".to_string())
        );
        assert!(fetcher.fetch("u").is_ok());
        assert_eq!(fetcher.call_count(), 3);
    }

    #[test]
    fn test_gate_blocks_until_released() {
        let fetcher = MockFetcher::new();
        fetcher.hold_after(1);

        let worker = {
            let fetcher = fetcher.clone();
            std::thread::spawn(move || {
                fetcher.fetch("first").unwrap();
                fetcher.fetch("second").unwrap();
            })
        };

        // Second call is parked on the gate
        for _ in 0..100 {
            if fetcher.call_count() == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(fetcher.call_count(), 1);

        fetcher.release(1);
        worker.join().unwrap();
        assert_eq!(fetcher.fetched_urls(), vec!["first", "second"]);
    }
}
