//! Read queries of the replication pipeline.
//!
//! One module per query shape: the query builder, its typed row and the
//! function that runs it.

pub mod discovery;
pub mod expand;
pub mod links;
pub mod org_info;
pub mod watermark;

pub use discovery::discover;
pub use expand::expand;
pub use links::fetch_links;
pub use org_info::fetch_org_info;
pub use watermark::resolve_watermark;

use casesync_core::sparql::SparqlQuery;
use casesync_core::{AttributedFact, CaseSyncResult, Fact, OrgId};

use crate::client::{QueryTarget, SparqlGateway};
use crate::results::{FromSolution, RowError, Solution};

/// Optional responsible-organization binding of `?submission`.
pub(crate) const ORG_OPTIONAL: &str = "OPTIONAL {
  ?submission omgeving:Rechtshandeling.verantwoordelijke ?org .
  OPTIONAL { ?org mu:uuid ?orgUuid . }
}";

/// Attributed facts returned by one or more queries, plus drop counts.
#[derive(Debug, Clone, Default)]
pub struct FactSet {
    pub rows: Vec<AttributedFact>,
    pub unattributed: usize,
    pub unsupported: usize,
}

impl FactSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn absorb(&mut self, other: FactSet) {
        self.rows.extend(other.rows);
        self.unattributed += other.unattributed;
        self.unsupported += other.unsupported;
    }
}

/// Resolve the organization of a solution from `?orgUuid` / `?org`.
///
/// An unusable organization binding counts as no organization.
pub(crate) fn solution_org(solution: &Solution) -> Result<OrgId, RowError> {
    let uuid = solution.term("orgUuid").ok().flatten();
    let reference = solution.term("org").ok().flatten();
    OrgId::resolve(uuid.as_ref(), reference.as_ref()).ok_or(RowError::Unattributed)
}

/// `?org ?orgUuid ?s ?p ?o` solution.
struct FactRow(AttributedFact);

impl FromSolution for FactRow {
    fn from_solution(solution: &Solution) -> Result<Self, RowError> {
        let org = solution_org(solution)?;
        let fact = Fact::new(
            solution.required_iri("s")?,
            solution.required_iri("p")?,
            solution.required("o")?,
        );
        Ok(FactRow(AttributedFact::new(org, fact)))
    }
}

/// Run a query projecting `?org ?orgUuid ?s ?p ?o`.
pub(crate) async fn fetch_facts(
    gateway: &dyn SparqlGateway,
    query: &SparqlQuery,
    target: &QueryTarget,
) -> CaseSyncResult<FactSet> {
    let decoded = gateway.select(query, target).await?.decode::<FactRow>()?;
    Ok(FactSet {
        rows: decoded.rows.into_iter().map(|r| r.0).collect(),
        unattributed: decoded.unattributed,
        unsupported: decoded.unsupported,
    })
}
