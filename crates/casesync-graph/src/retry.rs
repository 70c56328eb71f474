//! Bounded retry of transient read failures.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use casesync_core::sparql::{InsertData, SparqlQuery};
use casesync_core::{CaseSyncResult, RetrySettings};

use crate::client::{QueryTarget, SparqlGateway};
use crate::results::SelectResults;

/// Attempts and exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.max_attempts, Duration::from_millis(settings.base_delay_ms))
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempts run out.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> CaseSyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CaseSyncResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let backoff = policy.delay_for(attempt);
                warn!(
                    label,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Gateway decorator that retries reads whose target allows it.
///
/// Inserts pass straight through: a failed partition write is reported, not
/// retried within the same run.
pub struct Retrying {
    inner: Arc<dyn SparqlGateway>,
    policy: RetryPolicy,
}

impl Retrying {
    pub fn new(inner: Arc<dyn SparqlGateway>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl SparqlGateway for Retrying {
    async fn select(
        &self,
        query: &SparqlQuery,
        target: &QueryTarget,
    ) -> CaseSyncResult<SelectResults> {
        if !target.may_retry {
            return self.inner.select(query, target).await;
        }
        with_retry(&self.policy, "select", || self.inner.select(query, target)).await
    }

    async fn insert(&self, data: &InsertData) -> CaseSyncResult<()> {
        self.inner.insert(data).await
    }
}
