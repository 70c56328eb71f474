//! Change discovery: records created after the watermark.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use casesync_core::sparql::{GraphScope, SelectBuilder, SparqlQuery};
use casesync_core::CaseSyncResult;

use crate::client::{ReadSource, SparqlGateway};
use crate::results::{FromSolution, RowError, Solution};

/// Records newer than `after`, newest first, IRI as tie-break.
pub fn discovery_query(
    scope: &GraphScope,
    after: DateTime<Utc>,
    limit: Option<usize>,
) -> SparqlQuery {
    SelectBuilder::new(&["uri", "created"])
        .distinct()
        .scope(scope)
        .pattern("?uri a dbpedia:Case ;\n     omgeving:ingangsdatum ?created .")
        .filter_after("created", after)
        .order_by("DESC(?created)")
        .order_by("?uri")
        .limit(limit)
        .build()
}

struct RecordRow(String);

impl FromSolution for RecordRow {
    fn from_solution(solution: &Solution) -> Result<Self, RowError> {
        Ok(RecordRow(solution.required_iri("uri")?))
    }
}

/// Candidate record IRIs newer than `watermark`, in query order.
///
/// A record seen in several graphs keeps its first position. `limit` of
/// `None` lifts the page bound.
pub async fn discover(
    gateway: &dyn SparqlGateway,
    source: &ReadSource,
    watermark: DateTime<Utc>,
    limit: Option<usize>,
) -> CaseSyncResult<Vec<String>> {
    let query = discovery_query(&source.scope, watermark, limit);
    let decoded = gateway
        .select(&query, &source.target)
        .await?
        .decode::<RecordRow>()?;

    let mut seen = HashSet::new();
    Ok(decoded
        .rows
        .into_iter()
        .map(|row| row.0)
        .filter(|uri| seen.insert(uri.clone()))
        .collect())
}
