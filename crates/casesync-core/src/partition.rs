//! Grouping of attributed facts by organization.

use std::collections::HashMap;

use crate::model::{AttributedFact, OrgId};

/// Serialized statements destined for one organization graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub org: OrgId,
    pub statements: Vec<String>,
}

/// Facts grouped per organization, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionedBatch {
    partitions: Vec<Partition>,
}

impl PartitionedBatch {
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Number of partitions.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Total statements across all partitions.
    pub fn statement_count(&self) -> usize {
        self.partitions.iter().map(|p| p.statements.len()).sum()
    }

    pub fn get(&self, org: &OrgId) -> Option<&Partition> {
        self.partitions.iter().find(|p| &p.org == org)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter()
    }

    pub fn orgs(&self) -> impl Iterator<Item = &OrgId> {
        self.partitions.iter().map(|p| &p.org)
    }
}

/// Partition facts by organization key.
///
/// Pure: group order follows the first appearance of each organization and
/// statements keep their input order. Nothing is deduplicated.
pub fn group(rows: &[AttributedFact]) -> PartitionedBatch {
    let mut partitions: Vec<Partition> = Vec::new();
    let mut index: HashMap<&OrgId, usize> = HashMap::new();

    for row in rows {
        let slot = *index.entry(&row.org).or_insert_with(|| {
            partitions.push(Partition {
                org: row.org.clone(),
                statements: Vec::new(),
            });
            partitions.len() - 1
        });
        partitions[slot].statements.push(row.fact.to_statement());
    }

    PartitionedBatch { partitions }
}

/// Destination graph of an organization: `prefix` + id.
pub fn partition_graph(prefix: &str, org: &OrgId) -> String {
    format!("{}{}", prefix, org.as_str())
}
