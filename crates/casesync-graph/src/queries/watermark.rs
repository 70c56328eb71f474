//! Watermark: the newest record creation timestamp already replicated.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::debug;

use casesync_core::sparql::{SelectBuilder, SparqlQuery};
use casesync_core::{CaseSyncError, CaseSyncResult, SyncConfig, Term};

use crate::client::{QueryTarget, SparqlGateway};
use crate::results::{FromSolution, RowError, Solution};

/// Max creation timestamp over every organization graph.
pub fn watermark_query(organization_graph_prefix: &str) -> SparqlQuery {
    SelectBuilder::new(&["created"])
        .pattern("?uri a dbpedia:Case ;\n     omgeving:ingangsdatum ?created .")
        .filter_prefix("g", organization_graph_prefix)
        .order_by("DESC(?created)")
        .limit(Some(1))
        .build()
}

struct CreatedRow(Term);

impl FromSolution for CreatedRow {
    fn from_solution(solution: &Solution) -> Result<Self, RowError> {
        Ok(CreatedRow(solution.required("created")?))
    }
}

/// Resolve the cutoff after which remote records count as new.
///
/// Returns the configured epoch when nothing was replicated yet, and without
/// querying at all when a full resync is requested. Never earlier than the
/// epoch.
pub async fn resolve_watermark(
    gateway: &dyn SparqlGateway,
    config: &SyncConfig,
) -> CaseSyncResult<DateTime<Utc>> {
    if config.full_resync {
        debug!(epoch = %config.epoch, "Full resync requested, ignoring replicated state");
        return Ok(config.epoch);
    }

    let query = watermark_query(&config.organization_graph_prefix);
    let decoded = gateway
        .select(&query, &QueryTarget::local())
        .await?
        .decode::<CreatedRow>()?;

    match decoded.rows.first() {
        Some(CreatedRow(created)) => {
            let stored = parse_timestamp(created.lexical())?;
            Ok(stored.max(config.epoch))
        }
        None => {
            debug!(epoch = %config.epoch, "No replicated records yet, starting from epoch");
            Ok(config.epoch)
        }
    }
}

/// Parse an `xsd:dateTime` (with or without offset) or `xsd:date` value.
pub fn parse_timestamp(value: &str) -> CaseSyncResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    Err(CaseSyncError::InvalidTimestamp(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use casesync_core::sparql::ns;
    use chrono::TimeZone;

    use crate::results::SelectResults;
    use crate::testutil::FakeGateway;

    fn created(value: &str) -> SelectResults {
        SelectResults::from_solutions(
            &["created"],
            vec![Solution::new().typed("created", value, ns::XSD_DATE_TIME)],
        )
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-02-01T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-02-01T01:00:00+01:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-02-01T00:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-02-01").unwrap(), expected);
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(CaseSyncError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_query_only_reads_organization_graphs() {
        let query = watermark_query("http://mu.semte.ch/graphs/organizations/");
        let text = query.as_str();
        assert!(text.contains(
            "FILTER(STRSTARTS(STR(?g), \"http://mu.semte.ch/graphs/organizations/\"))"
        ));
        assert!(text.ends_with("ORDER BY DESC(?created)\nLIMIT 1"));
    }

    #[tokio::test]
    async fn test_empty_store_resolves_to_epoch() {
        let fake = FakeGateway::new();
        let config = SyncConfig::default();
        let watermark = resolve_watermark(&fake, &config).await.unwrap();
        assert_eq!(watermark, config.epoch);
        assert_eq!(fake.targets(), vec![QueryTarget::local()]);
    }

    #[tokio::test]
    async fn test_resolves_stored_maximum() {
        let fake = FakeGateway::new();
        fake.push_select(created("2024-03-15T10:30:00Z"));
        let watermark = resolve_watermark(&fake, &SyncConfig::default()).await.unwrap();
        assert_eq!(watermark, Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn test_full_resync_skips_query() {
        let fake = FakeGateway::new();
        fake.push_select(created("2024-03-15T10:30:00Z"));
        let config = SyncConfig {
            full_resync: true,
            ..SyncConfig::default()
        };
        let watermark = resolve_watermark(&fake, &config).await.unwrap();
        assert_eq!(watermark, config.epoch);
        assert_eq!(fake.select_count(), 0);
    }

    #[tokio::test]
    async fn test_watermark_is_monotonic_as_store_grows() {
        let fake = FakeGateway::new();
        let config = SyncConfig::default();
        fake.push_select(created("2024-02-01T00:00:00Z"));
        fake.push_select(created("2024-02-03T00:00:00Z"));
        let first = resolve_watermark(&fake, &config).await.unwrap();
        let second = resolve_watermark(&fake, &config).await.unwrap();
        assert!(second >= first);
    }

    #[tokio::test]
    async fn test_never_before_epoch() {
        let fake = FakeGateway::new();
        fake.push_select(created("2020-01-01T00:00:00Z"));
        let config = SyncConfig::default();
        let watermark = resolve_watermark(&fake, &config).await.unwrap();
        assert_eq!(watermark, config.epoch);
    }
}
