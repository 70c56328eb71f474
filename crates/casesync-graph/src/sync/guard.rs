//! Mutual exclusion between sync runs.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Admits at most one sync run at a time.
///
/// Clones share the same lock, so the manual and periodic triggers stay
/// mutually exclusive when they are handed the same guard.
#[derive(Clone, Default)]
pub struct RunGuard {
    lock: Arc<Mutex<()>>,
}

/// Held for the duration of a run; dropping it admits the next run.
pub struct RunPermit {
    _guard: OwnedMutexGuard<()>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard without waiting; `None` when a run is in flight.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.lock
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| RunPermit { _guard: guard })
    }

    pub fn is_running(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let guard = RunGuard::new();
        let shared = guard.clone();

        let permit = guard.try_acquire().expect("first run admitted");
        assert!(shared.is_running());
        assert!(shared.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_running());
        assert!(shared.try_acquire().is_some());
    }
}
