//! Records whose replication did not fully land.
//!
//! A record enters the ledger when a chunk containing it had a failed
//! partition write or aborted, and leaves it once a later chunk containing it
//! writes cleanly or after `max_attempts` failed runs.

/// One record awaiting another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    pub uri: String,
    /// Failed runs so far.
    pub attempts: u32,
}

/// Bounded in-memory retry ledger, in insertion order.
#[derive(Debug)]
pub struct PendingLedger {
    entries: Vec<PendingRecord>,
    max_attempts: u32,
}

impl PendingLedger {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            entries: Vec::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn uris(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.uri.clone()).collect()
    }

    /// Forget records that were written cleanly.
    pub fn settle(&mut self, records: &[String]) {
        self.entries.retain(|e| !records.contains(&e.uri));
    }

    /// Count a failed attempt for each record.
    ///
    /// Returns the records that ran out of attempts; they are no longer
    /// tracked.
    pub fn record_failure(&mut self, records: &[String]) -> Vec<PendingRecord> {
        for uri in records {
            match self.entries.iter_mut().find(|e| &e.uri == uri) {
                Some(entry) => entry.attempts += 1,
                None => self.entries.push(PendingRecord {
                    uri: uri.clone(),
                    attempts: 1,
                }),
            }
        }

        let max_attempts = self.max_attempts;
        let (exhausted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.attempts >= max_attempts);
        self.entries = kept;
        exhausted
    }

    /// Track records that were never attempted, without counting an attempt.
    pub fn hold(&mut self, records: &[String]) {
        for uri in records {
            if !self.entries.iter().any(|e| &e.uri == uri) {
                self.entries.push(PendingRecord {
                    uri: uri.clone(),
                    attempts: 0,
                });
            }
        }
    }
}
