//! Periodic trigger.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{SyncEngine, TriggerOutcome};

/// Fire a sync every `period`, starting one period from now.
///
/// Shares the engine's run guard with manual triggers: a tick that lands
/// while a run is in flight is skipped, not queued.
pub fn spawn_periodic(engine: Arc<SyncEngine>, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "Periodic sync enabled");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match engine.trigger() {
                TriggerOutcome::Accepted => debug!("Scheduled sync started"),
                TriggerOutcome::AlreadyRunning => {
                    info!("Scheduled sync skipped, previous run still active")
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use casesync_core::SyncConfig;

    use crate::sync::RunGuard;
    use crate::testutil::FakeGateway;

    #[tokio::test(start_paused = true)]
    async fn test_fires_each_period() {
        let fake = Arc::new(FakeGateway::new());
        let engine = Arc::new(SyncEngine::new(
            fake.clone(),
            Arc::new(SyncConfig::default()),
            RunGuard::new(),
        ));

        let handle = spawn_periodic(engine, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fake.select_count(), 0);

        // Each run on an empty store is watermark + discovery.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fake.select_count(), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fake.select_count(), 4);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_skipped_while_running() {
        let fake = Arc::new(FakeGateway::new());
        let guard = RunGuard::new();
        let engine = Arc::new(SyncEngine::new(
            fake.clone(),
            Arc::new(SyncConfig::default()),
            guard.clone(),
        ));

        let permit = guard.try_acquire().unwrap();
        let handle = spawn_periodic(engine, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fake.select_count(), 0);

        drop(permit);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fake.select_count(), 2);

        handle.abort();
    }
}
