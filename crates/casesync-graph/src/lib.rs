//! # casesync graph
//!
//! Talks SPARQL to the remote source and the local partitioned store, and
//! runs the incremental replication pipeline on top of it.

pub mod client;
pub mod queries;
pub mod results;
pub mod retry;
pub mod sync;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use client::{Endpoint, HttpGateway, QueryTarget, ReadSource, SparqlGateway};
pub use results::{SelectResults, Solution};
pub use retry::{RetryPolicy, Retrying};
pub use sync::{RunGuard, RunOutcome, SyncEngine, SyncPhase, SyncReport, TriggerOutcome};
