//! Relation expansion: every fact replicated for a batch of records.
//!
//! Two round-trips per batch regardless of its size: the record, submission
//! and one-hop entity facts, then the applicant facts.

use tracing::debug;

use casesync_core::sparql::{GraphScope, SelectBuilder, SparqlQuery};
use casesync_core::CaseSyncResult;

use super::{fetch_facts, FactSet, ORG_OPTIONAL};
use crate::client::{ReadSource, SparqlGateway};

const FACT_PROJECTION: &[&str] = &["org", "orgUuid", "s", "p", "o"];

/// Facts of the record itself (minus the submission link), the submission,
/// and the subject, location and timeframe entities.
const RECORD_FACTS: &str = "?uri omgeving:zaakhandeling ?submission .
{
  ?uri ?p ?o .
  BIND(?uri AS ?s)
  FILTER(?p != omgeving:zaakhandeling)
}
UNION
{
  ?submission ?p ?o .
  BIND(?submission AS ?s)
}
UNION
{
  ?uri dct:subject ?s .
  ?s ?p ?o .
}
UNION
{
  ?uri dct:subject/omgeving:locatie ?s .
  ?s ?p ?o .
}
UNION
{
  ?uri dct:subject/omgeving:Activiteit.tijdsbestek ?s .
  ?s ?p ?o .
}";

const APPLICANT_FACTS: &str = "?uri omgeving:zaakhandeling ?submission .
?submission omgeving:aanvrager ?s .
?s ?p ?o .";

pub fn facts_query<S: AsRef<str>>(scope: &GraphScope, records: &[S]) -> SparqlQuery {
    SelectBuilder::new(FACT_PROJECTION)
        .distinct()
        .scope(scope)
        .values_iris("uri", records)
        .pattern(RECORD_FACTS)
        .pattern(ORG_OPTIONAL)
        .build()
}

pub fn applicant_query<S: AsRef<str>>(scope: &GraphScope, records: &[S]) -> SparqlQuery {
    SelectBuilder::new(FACT_PROJECTION)
        .distinct()
        .scope(scope)
        .values_iris("uri", records)
        .pattern(APPLICANT_FACTS)
        .pattern(ORG_OPTIONAL)
        .build()
}

/// Fetch the attributed facts of `records`.
pub async fn expand<S: AsRef<str> + Sync>(
    gateway: &dyn SparqlGateway,
    source: &ReadSource,
    records: &[S],
) -> CaseSyncResult<FactSet> {
    if records.is_empty() {
        return Ok(FactSet::default());
    }

    let mut facts =
        fetch_facts(gateway, &facts_query(&source.scope, records), &source.target).await?;
    let applicants =
        fetch_facts(gateway, &applicant_query(&source.scope, records), &source.target).await?;
    facts.absorb(applicants);

    debug!(
        records = records.len(),
        rows = facts.rows.len(),
        unattributed = facts.unattributed,
        unsupported = facts.unsupported,
        "Expanded records"
    );
    Ok(facts)
}
