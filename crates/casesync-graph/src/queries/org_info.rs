//! Facts describing the responsible organization itself.

use casesync_core::sparql::{GraphScope, SelectBuilder, SparqlQuery};
use casesync_core::CaseSyncResult;

use super::{fetch_facts, FactSet};
use crate::client::{ReadSource, SparqlGateway};

const ORG_FACTS: &str = "?uri omgeving:zaakhandeling ?submission .
?submission omgeving:Rechtshandeling.verantwoordelijke ?org .
OPTIONAL { ?org mu:uuid ?orgUuid . }
?org ?p ?o .
BIND(?org AS ?s)";

pub fn org_info_query<S: AsRef<str>>(scope: &GraphScope, records: &[S]) -> SparqlQuery {
    SelectBuilder::new(&["org", "orgUuid", "s", "p", "o"])
        .distinct()
        .scope(scope)
        .values_iris("uri", records)
        .pattern(ORG_FACTS)
        .build()
}

/// Facts of each responsible organization, attributed to that organization.
pub async fn fetch_org_info<S: AsRef<str> + Sync>(
    gateway: &dyn SparqlGateway,
    source: &ReadSource,
    records: &[S],
) -> CaseSyncResult<FactSet> {
    if records.is_empty() {
        return Ok(FactSet::default());
    }
    fetch_facts(gateway, &org_info_query(&source.scope, records), &source.target).await
}
