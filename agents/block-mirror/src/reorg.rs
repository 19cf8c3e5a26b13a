//! Reorg monitor: drop local blocks above a regressed chain height.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::error::MirrorResult;
use crate::height::HeightSource;
use crate::metrics::MirrorMetrics;
use crate::node::{BlockSource, RetryPolicy};
use crate::store::BlockStore;

/// Polls both heights and deletes every stored block at or above the remote
/// height once the node reports a height below the local maximum.
///
/// Runs unsynchronized with the ingest loops. A delete that races a write
/// is repaired by later catch-up or update cycles re-fetching those heights.
/// Content changes at an unchanged height are left to the conflict policy.
#[derive(Debug)]
pub struct ReorgMonitor<S, D> {
    heights: HeightSource<S, D>,
    throttle: Duration,
    metrics: MirrorMetrics,
}

impl<S: BlockSource, D: BlockStore> ReorgMonitor<S, D> {
    pub fn new(
        source: Arc<S>,
        store: D,
        retry: RetryPolicy,
        throttle: Duration,
        metrics: MirrorMetrics,
    ) -> Self {
        Self {
            heights: HeightSource::new(source, store, retry),
            throttle,
            metrics,
        }
    }

    /// One comparison. Returns the deleted heights, empty when the chain did
    /// not regress.
    pub async fn cycle(&self) -> MirrorResult<Vec<u64>> {
        let heights = self.heights.both().await?;
        self.metrics.set_remote_height(heights.remote);
        match heights.local {
            Some(local) if heights.remote < local => {
                let deleted = self.heights.store().delete_from(heights.remote).await?;
                self.metrics.record_rollback(deleted.len() as u64);
                self.metrics.set_local_height(heights.remote.checked_sub(1));
                Ok(deleted)
            }
            local => {
                debug!(remote = heights.remote, ?local, "No rollback");
                Ok(vec![])
            }
        }
    }

    /// Run cycles forever, `throttle` apart. Failed cycles are logged.
    #[instrument(name = "reorg_monitor", skip(self), fields(throttle = ?self.throttle))]
    pub async fn run(&self) {
        info!("Starting reorg monitor");
        loop {
            match self.cycle().await {
                Ok(deleted) if deleted.is_empty() => {}
                Ok(deleted) => warn!(count = deleted.len(), ?deleted, "Rolled back blocks"),
                Err(err) => warn!(?err, "Failed rollback check"),
            }
            sleep(self.throttle).await;
        }
    }
}
