//! Record -> Submission links, replicated only where the submission's
//! organization receives data.

use casesync_core::sparql::{ns, GraphScope, SelectBuilder, SparqlQuery};
use casesync_core::{AttributedFact, CaseSyncResult, Fact, Term};

use super::{solution_org, FactSet};
use crate::client::{ReadSource, SparqlGateway};
use crate::results::{FromSolution, RowError, Solution};

const LINKS: &str = "?uri omgeving:zaakhandeling ?submission .
?submission omgeving:Rechtshandeling.verantwoordelijke ?org .
OPTIONAL { ?org mu:uuid ?orgUuid . }";

pub fn links_query<S: AsRef<str>>(scope: &GraphScope, records: &[S]) -> SparqlQuery {
    SelectBuilder::new(&["org", "orgUuid", "uri", "submission"])
        .distinct()
        .scope(scope)
        .values_iris("uri", records)
        .pattern(LINKS)
        .build()
}

struct LinkRow(AttributedFact);

impl FromSolution for LinkRow {
    fn from_solution(solution: &Solution) -> Result<Self, RowError> {
        let org = solution_org(solution)?;
        let record = solution.required_iri("uri")?;
        let submission = solution.required_iri("submission")?;
        Ok(LinkRow(AttributedFact::new(
            org,
            Fact::new(record, ns::ZAAKHANDELING, Term::Iri(submission)),
        )))
    }
}

/// One `<record> omgeving:zaakhandeling <submission>` fact per organization.
pub async fn fetch_links<S: AsRef<str> + Sync>(
    gateway: &dyn SparqlGateway,
    source: &ReadSource,
    records: &[S],
) -> CaseSyncResult<FactSet> {
    if records.is_empty() {
        return Ok(FactSet::default());
    }
    let decoded = gateway
        .select(&links_query(&source.scope, records), &source.target)
        .await?
        .decode::<LinkRow>()?;
    Ok(FactSet {
        rows: decoded.rows.into_iter().map(|r| r.0).collect(),
        unattributed: decoded.unattributed,
        unsupported: decoded.unsupported,
    })
}
