//! Service configuration.
//!
//! Layered as: built-in defaults, then an optional TOML file, then
//! environment variables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{CaseSyncError, CaseSyncResult};

/// Default remote SPARQL endpoint.
pub const DEFAULT_REMOTE_ENDPOINT: &str = "http://the.custom.endpoint/sparql";

/// Default local (destination) SPARQL endpoint.
pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://database:8890/sparql";

/// Graph read from in mock mode.
pub const DEFAULT_MOCK_GRAPH: &str = "http://mu.semte.ch/graphs/mock-remote";

/// Prefix of the per-organization destination graphs.
pub const DEFAULT_ORGANIZATION_GRAPH_PREFIX: &str = "http://mu.semte.ch/graphs/organizations/";

/// Watermark used when nothing has been replicated yet.
pub const DEFAULT_EPOCH: &str = "2024-01-01T00:00:00Z";

/// Config file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "casesync.toml";

/// Retry behaviour for transient read failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Runs a record with failed writes is retried in before it is dropped.
    pub record_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            record_attempts: 3,
        }
    }
}

/// How often the periodic trigger fires.
///
/// Accepts minute/hour step cron expressions (`*/5 * * * *`, `0 */2 * * *`)
/// or plain durations (`90s`, `5m`, `1h`, `300`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Schedule {
    expr: String,
    period: Duration,
}

impl Schedule {
    pub fn parse(expr: &str) -> CaseSyncResult<Self> {
        let expr = expr.trim();
        let period = if expr.split_whitespace().count() == 5 {
            parse_cron_step(expr)?
        } else {
            parse_duration(expr)?
        };
        if period.is_zero() {
            return Err(CaseSyncError::config(format!("schedule '{}' has a zero period", expr)));
        }
        Ok(Self {
            expr: expr.to_string(),
            period,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            expr: "*/5 * * * *".to_string(),
            period: Duration::from_secs(5 * 60),
        }
    }
}

impl TryFrom<String> for Schedule {
    type Error = CaseSyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Schedule> for String {
    fn from(schedule: Schedule) -> Self {
        schedule.expr
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (every {}s)", self.expr, self.period.as_secs())
    }
}

fn parse_step(field: &str) -> Option<u64> {
    match field {
        "*" => Some(1),
        f => f.strip_prefix("*/").and_then(|n| n.parse().ok()),
    }
}

/// `count` units of `unit_secs` seconds, `None` on overflow.
fn scaled(count: u64, unit_secs: u64) -> Option<Duration> {
    count.checked_mul(unit_secs).map(Duration::from_secs)
}

fn parse_cron_step(expr: &str) -> CaseSyncResult<Duration> {
    let unsupported = || {
        CaseSyncError::config(format!(
            "unsupported schedule '{}': only minute or hour steps are recognized",
            expr
        ))
    };
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields[2..].iter().any(|f| *f != "*") {
        return Err(unsupported());
    }
    match (fields[0], fields[1]) {
        (minute, "*") if minute.starts_with('*') => parse_step(minute)
            .and_then(|n| scaled(n, 60))
            .ok_or_else(unsupported),
        (minute, hour) if minute.parse::<u8>().is_ok_and(|m| m < 60) => parse_step(hour)
            .and_then(|n| scaled(n, 3600))
            .ok_or_else(unsupported),
        _ => Err(unsupported()),
    }
}

fn parse_duration(expr: &str) -> CaseSyncResult<Duration> {
    let invalid = || CaseSyncError::config(format!("invalid schedule '{}'", expr));
    let (digits, unit) = match expr.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => expr.split_at(idx),
        None => (expr, "s"),
    };
    let n: u64 = digits.parse().map_err(|_| invalid())?;
    let unit_secs = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(invalid()),
    };
    scaled(n, unit_secs).ok_or_else(invalid)
}

/// Where discovery and expansion read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    /// A remote SPARQL endpoint, any graph.
    Remote { endpoint: String },
    /// A single graph of the local store.
    Mock { graph: String },
}

/// Full service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote source endpoint; empty or absent switches to mock mode.
    pub remote_endpoint: Option<String>,
    pub local_endpoint: String,
    pub mock_graph: String,
    pub organization_graph_prefix: String,
    /// Ignore the watermark and lift the discovery bound.
    pub full_resync: bool,
    /// Start the periodic trigger on boot.
    pub auto_start: bool,
    pub schedule: Schedule,
    pub page_size: usize,
    pub epoch: DateTime<Utc>,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_endpoint: Some(DEFAULT_REMOTE_ENDPOINT.to_string()),
            local_endpoint: DEFAULT_LOCAL_ENDPOINT.to_string(),
            mock_graph: DEFAULT_MOCK_GRAPH.to_string(),
            organization_graph_prefix: DEFAULT_ORGANIZATION_GRAPH_PREFIX.to_string(),
            full_resync: false,
            auto_start: false,
            schedule: Schedule::default(),
            page_size: 10,
            epoch: default_epoch(),
            request_timeout_secs: 60,
            retry: RetrySettings::default(),
        }
    }
}

fn default_epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(DEFAULT_EPOCH)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn parse_bool(key: &str, value: &str) -> CaseSyncResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(CaseSyncError::config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

impl SyncConfig {
    /// Load configuration from an optional file plus the process environment.
    ///
    /// An explicit `path` must exist; without one, `casesync.toml` in the
    /// working directory is used if present.
    pub fn load(path: Option<&Path>) -> CaseSyncResult<Self> {
        let default_file = Path::new(DEFAULT_CONFIG_FILE);
        let file = path.or_else(|| default_file.exists().then_some(default_file));
        let mut config = match file {
            Some(file) => {
                debug!(path = %file.display(), "Loading configuration file");
                Self::from_toml_str(&std::fs::read_to_string(file)?)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        let config = config.validate()?;
        debug!(
            source = ?config.source(),
            schedule = %config.schedule,
            page_size = config.page_size,
            "Configuration resolved"
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> CaseSyncResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from environment-style variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> CaseSyncResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("REMOTE_SPARQL_ENDPOINT") {
            self.remote_endpoint = Some(v);
        }
        if let Some(v) = lookup("MU_SPARQL_ENDPOINT") {
            self.local_endpoint = v;
        }
        if let Some(v) = lookup("MOCK_GRAPH") {
            self.mock_graph = v;
        }
        if let Some(v) = lookup("ORGANIZATION_GRAPH_PREFIX") {
            self.organization_graph_prefix = v;
        }
        if let Some(v) = lookup("FULL_RESYNC") {
            self.full_resync = parse_bool("FULL_RESYNC", &v)?;
        }
        if let Some(v) = lookup("AUTO_START_SYNC") {
            self.auto_start = parse_bool("AUTO_START_SYNC", &v)?;
        }
        if let Some(v) = lookup("SYNC_SCHEDULE") {
            self.schedule = Schedule::parse(&v)?;
        }
        if let Some(v) = lookup("SYNC_PAGE_SIZE") {
            self.page_size = v.trim().parse().map_err(|_| {
                CaseSyncError::config(format!("SYNC_PAGE_SIZE must be a number, got '{}'", v))
            })?;
        }
        if let Some(v) = lookup("SYNC_EPOCH") {
            self.epoch = DateTime::parse_from_rfc3339(v.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| {
                    CaseSyncError::config(format!("SYNC_EPOCH must be RFC 3339, got '{}'", v))
                })?;
        }
        Ok(())
    }

    /// Normalize and check the configuration.
    pub fn validate(mut self) -> CaseSyncResult<Self> {
        self.remote_endpoint = self
            .remote_endpoint
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if self.local_endpoint.trim().is_empty() {
            return Err(CaseSyncError::config("local_endpoint must not be empty"));
        }
        if self.organization_graph_prefix.trim().is_empty() {
            return Err(CaseSyncError::config("organization_graph_prefix must not be empty"));
        }
        if self.page_size == 0 {
            return Err(CaseSyncError::config("page_size must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(CaseSyncError::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.record_attempts == 0 {
            return Err(CaseSyncError::config("retry.record_attempts must be at least 1"));
        }
        Ok(self)
    }

    /// Where records are read from.
    pub fn source(&self) -> SourceMode {
        match &self.remote_endpoint {
            Some(endpoint) => SourceMode::Remote {
                endpoint: endpoint.clone(),
            },
            None => SourceMode::Mock {
                graph: self.mock_graph.clone(),
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default().validate().unwrap();
        assert_eq!(
            config.source(),
            SourceMode::Remote {
                endpoint: DEFAULT_REMOTE_ENDPOINT.to_string()
            }
        );
        assert_eq!(config.page_size, 10);
        assert!(!config.full_resync);
        assert!(!config.auto_start);
        assert_eq!(config.schedule.period(), Duration::from_secs(300));
        assert_eq!(config.epoch.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_toml_partial_file() {
        let config = SyncConfig::from_toml_str(
            r#"
            full_resync = true
            schedule = "90s"
            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert!(config.full_resync);
        assert_eq!(config.schedule.period(), Duration::from_secs(90));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.retry.record_attempts, 3);
        assert_eq!(config.local_endpoint, DEFAULT_LOCAL_ENDPOINT);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_size = 25\nmock_graph = \"http://ex.org/g\"").unwrap();
        let config = SyncConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.mock_graph, "http://ex.org/g");
    }

    #[test]
    fn test_empty_remote_endpoint_means_mock_mode() {
        let mut config = SyncConfig::default();
        config
            .apply_env(env(&[("REMOTE_SPARQL_ENDPOINT", "  ")]))
            .unwrap();
        let config = config.validate().unwrap();
        assert_eq!(
            config.source(),
            SourceMode::Mock {
                graph: DEFAULT_MOCK_GRAPH.to_string()
            }
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SyncConfig::default();
        config
            .apply_env(env(&[
                ("FULL_RESYNC", "yes"),
                ("AUTO_START_SYNC", "1"),
                ("SYNC_SCHEDULE", "0 */2 * * *"),
                ("SYNC_EPOCH", "2023-06-01T12:00:00Z"),
                ("MU_SPARQL_ENDPOINT", "http://localhost:8890/sparql"),
            ]))
            .unwrap();
        assert!(config.full_resync);
        assert!(config.auto_start);
        assert_eq!(config.schedule.period(), Duration::from_secs(7200));
        assert_eq!(config.epoch.to_rfc3339(), "2023-06-01T12:00:00+00:00");
        assert_eq!(config.local_endpoint, "http://localhost:8890/sparql");
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = SyncConfig::default();
        assert!(config.apply_env(env(&[("FULL_RESYNC", "maybe")])).is_err());
        assert!(config.apply_env(env(&[("SYNC_PAGE_SIZE", "ten")])).is_err());
        assert!(config.apply_env(env(&[("SYNC_SCHEDULE", "0 0 1 * *")])).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = SyncConfig {
            page_size: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_schedule_forms() {
        assert_eq!(Schedule::parse("* * * * *").unwrap().period(), Duration::from_secs(60));
        assert_eq!(Schedule::parse("*/5 * * * *").unwrap().period(), Duration::from_secs(300));
        assert_eq!(Schedule::parse("0 * * * *").unwrap().period(), Duration::from_secs(3600));
        assert_eq!(Schedule::parse("5m").unwrap().period(), Duration::from_secs(300));
        assert_eq!(Schedule::parse("1h").unwrap().period(), Duration::from_secs(3600));
        assert_eq!(Schedule::parse("45").unwrap().period(), Duration::from_secs(45));
        assert!(Schedule::parse("0s").is_err());
        assert!(Schedule::parse("5 minutes").is_err());
        assert!(Schedule::parse("15 10 * * *").is_err());
    }

    #[test]
    fn test_oversized_schedule_is_rejected() {
        for expr in [
            "*/400000000000000000 * * * *",
            "0 */400000000000000000 * * *",
            "400000000000000000h",
            "18446744073709551615m",
        ] {
            assert!(
                matches!(Schedule::parse(expr), Err(CaseSyncError::Config(_))),
                "{} should be rejected",
                expr
            );
        }

        let mut config = SyncConfig::default();
        let result = config.apply_env(env(&[("SYNC_SCHEDULE", "*/400000000000000000 * * * *")]));
        assert!(matches!(result, Err(CaseSyncError::Config(_))));
    }
}
