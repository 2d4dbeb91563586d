//! Batch driver: drains every unfinalized pool, one at a time.

use std::time::Duration;

use stakepool_core::{PoolKey, PoolKind};
use tokio::time;
use tracing::{debug, info, warn};

use crate::processor::{PoolOutcome, PoolProcessor};
use crate::store::StorageError;

/// Configuration for the batch driver.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Pause between two pools (default: 3s).
    pub inter_pool_delay: Duration,
    /// Pools that ended longer ago than this are stale (default: 48h).
    pub max_pool_age_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            inter_pool_delay: Duration::from_secs(3),
            max_pool_age_secs: 48 * 60 * 60,
        }
    }
}

/// One pool's entry in a [`BatchResult`].
#[derive(Debug)]
pub struct PoolReport {
    pub kind: PoolKind,
    pub pool_key: PoolKey,
    pub outcome: PoolOutcome,
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<PoolReport>,
}

impl BatchResult {
    fn record(&mut self, kind: PoolKind, pool_key: PoolKey, outcome: PoolOutcome) {
        self.total += 1;
        match &outcome {
            PoolOutcome::Done(_) => self.succeeded += 1,
            PoolOutcome::Skipped(_) => self.skipped += 1,
            PoolOutcome::Failed(_) => self.failed += 1,
        }
        self.outcomes.push(PoolReport {
            kind,
            pool_key,
            outcome,
        });
    }

    /// `(kind, key, reason)` for every pool that did not finish.
    pub fn reasons(&self) -> Vec<(PoolKind, PoolKey, String)> {
        self.outcomes
            .iter()
            .filter_map(|r| r.outcome.reason().map(|reason| (r.kind, r.pool_key, reason)))
            .collect()
    }
}

pub struct AggregatorService {
    config: AggregatorConfig,
    processor: PoolProcessor,
}

impl AggregatorService {
    pub fn new(config: AggregatorConfig, processor: PoolProcessor) -> Self {
        Self { config, processor }
    }

    pub fn processor(&self) -> &PoolProcessor {
        &self.processor
    }

    pub async fn process_pool(&self, kind: PoolKind, key: PoolKey, force: bool) -> PoolOutcome {
        self.processor.process_pool(kind, key, force).await
    }

    /// Most recent pool whose ready time has passed.
    pub fn find_latest(&self) -> Option<PoolKey> {
        PoolKey::latest_ready(self.processor.now())
    }

    /// Unfinalized pools of the configured `kinds`, stale ones dropped,
    /// oldest first.
    pub async fn pending_pools(&self, kinds: &[PoolKind]) -> Result<Vec<(PoolKind, PoolKey)>, StorageError> {
        let now = self.processor.now();
        let mut pending = Vec::new();

        for &kind in kinds {
            if !self.processor.is_configured(kind) {
                warn!(%kind, "pool kind not configured, skipping");
                continue;
            }
            for key in self.processor.store().fetch_unfinalized_pool_keys(kind).await? {
                if key.end().saturating_add(self.config.max_pool_age_secs) < now {
                    debug!(%kind, day = key.day, period = key.period, "pool is stale, ignoring");
                    continue;
                }
                pending.push((kind, key));
            }
        }

        pending.sort_by_key(|&(kind, key)| (key, kind));
        Ok(pending)
    }

    /// Run every pending pool through the processor. A failed pool is
    /// recorded and the batch moves on.
    pub async fn process_all_pools(&self, kinds: &[PoolKind], force: bool) -> Result<BatchResult, StorageError> {
        let pending = self.pending_pools(kinds).await?;
        info!(pools = pending.len(), "processing pending pools");

        let mut result = BatchResult::default();
        for (i, (kind, key)) in pending.into_iter().enumerate() {
            if i > 0 && !self.config.inter_pool_delay.is_zero() {
                time::sleep(self.config.inter_pool_delay).await;
            }
            let outcome = self.processor.process_pool(kind, key, force).await;
            result.record(kind, key, outcome);
        }

        info!(
            total = result.total,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            "batch complete"
        );
        for (kind, key, reason) in result.reasons() {
            info!(%kind, day = key.day, period = key.period, %reason, "pool not finalized");
        }
        Ok(result)
    }
}
