//! Distributed mode
//!
//! Every host runs a node service. Any node can act as a batch coordinator for
//! the hosts in its registry: it creates one benchmark job per host over the
//! peer protocol and later re-queries them to build a batch view.
//!
//! # Modules
//!
//! - `protocol`: Message definitions and framing
//! - `client`: Outbound peer calls with timeouts and retries
//! - `coordinator`: Batch fan-out and aggregation
//! - `node_service`: TCP server dispatching requests to the local registries

pub mod client;
pub mod coordinator;
pub mod node_service;
pub mod protocol;

// Re-export key types
pub use client::{PeerClient, PeerError, PeerSettings, TcpPeerClient};
pub use coordinator::{
    Assignment, BatchCoordinator, BatchCreated, BatchError, BatchId, BatchJob, BatchResults,
    FailedHost, ReadMode, SINGLE_HOST_ADVISORY,
};
pub use node_service::{NodeService, ServiceState};
pub use protocol::{ErrorKind, ErrorMessage, Message, PROTOCOL_VERSION};
