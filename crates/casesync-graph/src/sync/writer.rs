//! Batch writer: one idempotent insert per organization graph.

use serde::Serialize;
use tracing::{debug, warn};

use casesync_core::sparql::InsertData;
use casesync_core::{partition_graph, OrgId, PartitionedBatch};

use crate::client::SparqlGateway;

/// A partition whose insert failed.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionFailure {
    pub org: OrgId,
    pub graph: String,
    pub error: String,
}

/// Outcome of writing one batch.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    pub partitions_written: usize,
    pub statements_written: usize,
    pub failures: Vec<PartitionFailure>,
}

impl WriteReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Insert every non-empty partition into its organization graph.
///
/// Each partition is a single `INSERT DATA` request, so it lands entirely or
/// not at all. A failed partition does not stop the others and nothing
/// already written is rolled back.
pub async fn write_batch(
    gateway: &dyn SparqlGateway,
    batch: &PartitionedBatch,
    graph_prefix: &str,
) -> WriteReport {
    let mut report = WriteReport::default();

    for partition in batch.iter().filter(|p| !p.statements.is_empty()) {
        let graph = partition_graph(graph_prefix, &partition.org);
        let insert = InsertData::new(graph.clone(), partition.statements.clone());

        match gateway.insert(&insert).await {
            Ok(()) => {
                debug!(
                    org = %partition.org,
                    graph = %graph,
                    statements = partition.statements.len(),
                    "Partition written"
                );
                report.partitions_written += 1;
                report.statements_written += partition.statements.len();
            }
            Err(e) => {
                warn!(org = %partition.org, graph = %graph, error = %e, "Partition write failed");
                report.failures.push(PartitionFailure {
                    org: partition.org.clone(),
                    graph,
                    error: e.to_string(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use casesync_core::{group, AttributedFact, Fact, Term};

    use crate::testutil::FakeGateway;

    const PREFIX: &str = "http://mu.semte.ch/graphs/organizations/";

    fn rows() -> Vec<AttributedFact> {
        ["7", "42", "7"]
            .iter()
            .enumerate()
            .map(|(i, org)| {
                AttributedFact::new(
                    OrgId::normalize(org).unwrap(),
                    Fact::new(
                        format!("http://ex.org/case/{}", i),
                        "http://purl.org/dc/terms/title",
                        Term::text(format!("case {}", i)),
                    ),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_one_insert_per_partition() {
        let fake = FakeGateway::new();
        let report = write_batch(&fake, &group(&rows()), PREFIX).await;

        assert!(report.is_clean());
        assert_eq!(report.partitions_written, 2);
        assert_eq!(report.statements_written, 3);

        let inserts = fake.inserts();
        assert_eq!(inserts.len(), 2);
        assert_eq!(inserts[0].graph, format!("{}7", PREFIX));
        assert_eq!(inserts[0].statements.len(), 2);
        assert_eq!(inserts[1].graph, format!("{}42", PREFIX));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let fake = FakeGateway::new();
        let report = write_batch(&fake, &group(&[]), PREFIX).await;
        assert!(report.is_clean());
        assert_eq!(report.partitions_written, 0);
        assert!(fake.inserts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_partition_does_not_block_others() {
        let fake = FakeGateway::new();
        fake.fail_graph(&format!("{}7", PREFIX));

        let report = write_batch(&fake, &group(&rows()), PREFIX).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].org.as_str(), "7");
        assert_eq!(report.partitions_written, 1);
        assert_eq!(fake.stored(&format!("{}42", PREFIX)).len(), 1);
        assert!(fake.stored(&format!("{}7", PREFIX)).is_empty());
    }

    #[tokio::test]
    async fn test_rewriting_is_idempotent() {
        let fake = FakeGateway::new();
        let batch = group(&rows());

        write_batch(&fake, &batch, PREFIX).await;
        let once = fake.snapshot();
        let report = write_batch(&fake, &batch, PREFIX).await;

        assert!(report.is_clean());
        assert_eq!(fake.snapshot(), once);
    }
}
