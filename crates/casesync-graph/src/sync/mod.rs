//! Incremental case replication.
//!
//! A run resolves the watermark, discovers records created after it, then
//! for each chunk of records expands their facts, groups them per
//! organization and writes links, facts and organization info into the
//! organization graphs. A step that yields nothing ends the chunk (or the
//! run) right there, so an unchanged source costs exactly two queries.
//!
//! Records whose writes did not fully land are kept in a [`PendingLedger`]
//! and ride along with the next run that discovers something new.

pub mod guard;
pub mod ledger;
pub mod schedule;
pub mod writer;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use casesync_core::{group, CaseSyncError, CaseSyncResult, SyncConfig};

use crate::client::{ReadSource, SparqlGateway};
use crate::queries::{discover, expand, fetch_links, fetch_org_info, resolve_watermark, FactSet};

pub use guard::{RunGuard, RunPermit};
pub use ledger::{PendingLedger, PendingRecord};
pub use schedule::spawn_periodic;
pub use writer::{write_batch, PartitionFailure, WriteReport};

/// Where the engine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    ResolvingWatermark,
    Discovering,
    Expanding,
    Grouping,
    WritingLinks,
    WritingFacts,
    WritingOrgInfo,
}

/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    NoNewRecords,
    Completed,
    PartiallyFailed,
}

/// Answer to a fire-and-forget trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Accepted,
    AlreadyRunning,
}

/// Summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub watermark: Option<DateTime<Utc>>,
    /// Records processed, newest first, retried ones last.
    pub records: Vec<String>,
    /// Records carried over from earlier runs with failed writes.
    pub retried_records: usize,
    pub partitions_written: usize,
    pub statements_written: usize,
    pub unattributed: usize,
    pub unsupported: usize,
    pub failures: Vec<PartitionFailure>,
    /// Records dropped from the retry ledger after exhausting their attempts.
    pub abandoned: Vec<String>,
    pub outcome: RunOutcome,
}

impl SyncReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            watermark: None,
            records: Vec::new(),
            retried_records: 0,
            partitions_written: 0,
            statements_written: 0,
            unattributed: 0,
            unsupported: 0,
            failures: Vec::new(),
            abandoned: Vec::new(),
            outcome: RunOutcome::NoNewRecords,
        }
    }

    fn absorb_drops(&mut self, facts: &FactSet) {
        self.unattributed += facts.unattributed;
        self.unsupported += facts.unsupported;
    }

    fn absorb_write(&mut self, write: WriteReport) {
        self.partitions_written += write.partitions_written;
        self.statements_written += write.statements_written;
        self.failures.extend(write.failures);
    }
}

/// Puts the phase back to idle however the run ends.
struct PhaseReset<'a>(&'a watch::Sender<SyncPhase>);

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        self.0.send_replace(SyncPhase::Idle);
    }
}

/// The sync orchestrator.
///
/// Owns the run guard it was built with and the ledger of records whose
/// writes did not fully land; those are re-expanded by the next run that
/// discovers new records.
pub struct SyncEngine {
    gateway: Arc<dyn SparqlGateway>,
    config: Arc<SyncConfig>,
    source: ReadSource,
    guard: RunGuard,
    phase: watch::Sender<SyncPhase>,
    pending: Mutex<PendingLedger>,
}

impl SyncEngine {
    pub fn new(gateway: Arc<dyn SparqlGateway>, config: Arc<SyncConfig>, guard: RunGuard) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            source: ReadSource::from_config(&config),
            gateway,
            config: config.clone(),
            guard,
            phase,
            pending: Mutex::new(PendingLedger::new(config.retry.record_attempts)),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Records waiting to be retried.
    pub fn pending_records(&self) -> Vec<String> {
        self.ledger().uris()
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, PendingLedger> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The watermark a run started now would use.
    pub async fn current_watermark(&self) -> CaseSyncResult<DateTime<Utc>> {
        resolve_watermark(self.gateway.as_ref(), &self.config).await
    }

    /// Run a sync in the caller's task.
    ///
    /// Fails with [`CaseSyncError::AlreadyRunning`] if another run holds the
    /// guard.
    pub async fn run_once(&self) -> CaseSyncResult<SyncReport> {
        let _permit = self.guard.try_acquire().ok_or(CaseSyncError::AlreadyRunning)?;
        self.run().await
    }

    /// Start a sync in the background and return immediately.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        let Some(permit) = self.guard.try_acquire() else {
            info!("Sync requested while a run is in progress, rejecting");
            return TriggerOutcome::AlreadyRunning;
        };

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            match engine.run().await {
                Ok(report) => debug!(
                    run_id = %report.run_id,
                    outcome = ?report.outcome,
                    "Triggered sync finished"
                ),
                Err(e) => error!(error = %e, "Sync run failed"),
            }
        });
        TriggerOutcome::Accepted
    }

    async fn run(&self) -> CaseSyncResult<SyncReport> {
        let mut report = SyncReport::new();
        let span = info_span!("sync_run", run_id = %report.run_id);
        self.run_phases(&mut report).instrument(span).await?;
        Ok(report)
    }

    fn enter(&self, phase: SyncPhase) {
        debug!(?phase, "Entering phase");
        self.phase.send_replace(phase);
    }

    async fn run_phases(&self, report: &mut SyncReport) -> CaseSyncResult<()> {
        let _reset = PhaseReset(&self.phase);
        let gateway = self.gateway.as_ref();

        self.enter(SyncPhase::ResolvingWatermark);
        let watermark = resolve_watermark(gateway, &self.config).await?;
        report.watermark = Some(watermark);

        self.enter(SyncPhase::Discovering);
        let limit = (!self.config.full_resync).then_some(self.config.page_size);
        let discovered = discover(gateway, &self.source, watermark, limit).await?;
        if discovered.is_empty() {
            info!(%watermark, pending = self.ledger().len(), "No new records");
            report.outcome = RunOutcome::NoNewRecords;
            return Ok(());
        }

        let candidates = self.with_pending(discovered, report);
        info!(
            %watermark,
            records = candidates.len(),
            retried = report.retried_records,
            "Replicating records"
        );
        report.records = candidates.clone();

        let chunks: Vec<&[String]> = candidates.chunks(self.config.page_size.max(1)).collect();
        for (idx, chunk) in chunks.iter().enumerate() {
            match self.sync_chunk(chunk, report).await {
                Ok(true) => self.ledger().settle(chunk),
                Ok(false) => self.record_failure(chunk, report),
                Err(e) => {
                    // Newer records may already be stored, which moves the
                    // watermark past everything left in this run.
                    self.record_failure(chunk, report);
                    let mut ledger = self.ledger();
                    for rest in &chunks[idx + 1..] {
                        ledger.hold(rest);
                    }
                    return Err(e);
                }
            }
        }

        report.outcome = if report.failures.is_empty() {
            RunOutcome::Completed
        } else {
            RunOutcome::PartiallyFailed
        };
        info!(
            outcome = ?report.outcome,
            partitions = report.partitions_written,
            statements = report.statements_written,
            failed_partitions = report.failures.len(),
            unattributed = report.unattributed,
            unsupported = report.unsupported,
            "Sync run finished"
        );
        Ok(())
    }

    /// Replicate one chunk of records. Returns whether every write landed.
    async fn sync_chunk(
        &self,
        records: &[String],
        report: &mut SyncReport,
    ) -> CaseSyncResult<bool> {
        let gateway = self.gateway.as_ref();
        let prefix = &self.config.organization_graph_prefix;
        let failures_before = report.failures.len();

        self.enter(SyncPhase::Expanding);
        let facts = expand(gateway, &self.source, records).await?;
        report.absorb_drops(&facts);
        if facts.is_empty() {
            info!(records = records.len(), "No attributable facts, skipping writes");
            return Ok(true);
        }

        self.enter(SyncPhase::Grouping);
        let fact_batch = group(&facts.rows);

        self.enter(SyncPhase::WritingLinks);
        let links = fetch_links(gateway, &self.source, records).await?;
        report.absorb_drops(&links);
        if links.is_empty() {
            info!(records = records.len(), "No record-submission links, skipping writes");
            return Ok(true);
        }
        report.absorb_write(write_batch(gateway, &group(&links.rows), prefix).await);

        self.enter(SyncPhase::WritingFacts);
        report.absorb_write(write_batch(gateway, &fact_batch, prefix).await);

        self.enter(SyncPhase::WritingOrgInfo);
        let org_info = fetch_org_info(gateway, &self.source, records).await?;
        report.absorb_drops(&org_info);
        if org_info.is_empty() {
            debug!("No organization info to write");
        } else {
            report.absorb_write(write_batch(gateway, &group(&org_info.rows), prefix).await);
        }

        Ok(report.failures.len() == failures_before)
    }

    /// Discovered records followed by pending ones not discovered again.
    fn with_pending(&self, discovered: Vec<String>, report: &mut SyncReport) -> Vec<String> {
        let pending = self.ledger().uris();
        let mut seen: HashSet<String> = discovered.iter().cloned().collect();
        let mut candidates = discovered;
        for uri in pending {
            if seen.insert(uri.clone()) {
                candidates.push(uri);
                report.retried_records += 1;
            }
        }
        candidates
    }

    fn record_failure(&self, records: &[String], report: &mut SyncReport) {
        let exhausted = self.ledger().record_failure(records);
        for record in exhausted {
            error!(
                record = %record.uri,
                attempts = record.attempts,
                "Giving up on record after repeated write failures"
            );
            report.abandoned.push(record.uri);
        }
    }
}
