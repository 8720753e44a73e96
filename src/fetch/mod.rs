//! Fetch abstraction
//!
//! A fetcher performs exactly one retrieval attempt against a URL and reports
//! whether it completed. Trials are built on top of this primitive and never
//! retry: one call, one classification.
//!
//! # Backends
//!
//! - **curl**: libcurl easy handle with connect and total timeouts (production)
//! - **mock**: scripted outcomes and artificial latency (tests)
//!
//! # Example
//!
//! ```
//! use fetchpulse::fetch::{Fetcher, mock::{MockFetcher, MockOutcome}};
//!
//! let fetcher = MockFetcher::new();
//! fetcher.push_outcome(MockOutcome::Http(404));
//!
//! assert!(fetcher.fetch("http://example.com/a.png").is_err());
//! assert!(fetcher.fetch("http://example.com/a.png").is_ok());
//! ```

pub mod curl;
pub mod mock;

use std::time::Duration;
use thiserror::Error;

/// Successful retrieval summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReceipt {
    /// Body bytes received
    pub bytes: u64,
    /// Final HTTP status code (after redirects)
    pub http_status: u32,
}

/// Fetch-layer failure
///
/// Any of these turns a trial into a failure. They are recorded on the trial
/// and never propagated to the job or its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Remote answered with a non-2xx status
    #[error("HTTP {0}")]
    Http(u32),

    /// The attempt exceeded the per-trial timeout
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// Connection, DNS, TLS or protocol failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Single-attempt retrieval primitive
///
/// Implementations must be shareable across job threads. Each call is one
/// attempt; retry policy, if any, belongs to the caller.
pub trait Fetcher: Send + Sync {
    /// Retrieve `url` once
    fn fetch(&self, url: &str) -> Result<FetchReceipt, FetchError>;
}
