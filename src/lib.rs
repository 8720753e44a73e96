//! FetchPulse - distributed image retrieval benchmark
//!
//! FetchPulse measures how long it takes to retrieve one image URL, over many
//! sequential trials, and how often the retrieval fails. Benchmarks can run on a
//! single host or be fanned out to a set of peer hosts and merged into one
//! batch view.
//!
//! # Architecture
//!
//! - **Trials**: one timed fetch each, classified as success or failure
//! - **Benchmark jobs**: N sequential trials, evaluated once into counts, error
//!   rate and duration statistics, with a terminal status
//! - **Job registry**: atomic ids, admission control, one thread per job
//! - **Host registry**: ordered address book of peer node services
//! - **Batch coordinator**: fan-out to every host, live re-query on read
//! - **Node service**: TCP server speaking a length-prefixed MessagePack protocol

pub mod config;
pub mod distributed;
pub mod fetch;
pub mod job;
pub mod logging;
pub mod output;
pub mod registry;
pub mod stats;
pub mod trial;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use fetch::Fetcher;
pub use job::{BenchmarkJob, JobRegistry, JobReport, JobRequest, JobStatus};
pub use trial::{Trial, TrialOutcome};

/// Result type used throughout FetchPulse
pub type Result<T> = anyhow::Result<T>;
