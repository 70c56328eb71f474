//! casesync core library
//!
//! Data model, configuration, SPARQL query building and partition grouping
//! for the case replication engine. Nothing in this crate touches the network.

pub mod config;
pub mod error;
pub mod model;
pub mod partition;
pub mod sparql;

pub use config::{RetrySettings, Schedule, SourceMode, SyncConfig};
pub use error::{CaseSyncError, CaseSyncResult};
pub use model::{AttributedFact, Fact, OrgId, Term};
pub use partition::{group, partition_graph, Partition, PartitionedBatch};
