//! Tip-following update cycles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::error::MirrorResult;
use crate::fetcher::BatchFetcher;
use crate::height::HeightSource;
use crate::metrics::{MirrorMetrics, Phase};
use crate::node::{BlockSource, RetryPolicy};
use crate::scheduler::TickHandler;
use crate::store::BlockStore;
use crate::types::HeightRange;
use crate::writer::BatchWriter;

/// Re-fetches and writes the most recent blocks below the chain tip.
#[derive(Debug)]
pub struct TipUpdater<S, D> {
    heights: HeightSource<S, D>,
    fetcher: BatchFetcher<S>,
    writer: BatchWriter<D>,
    /// Largest range sent to the node in one request.
    blocks_per_request: u64,
    metrics: MirrorMetrics,
}

impl<S: BlockSource, D: BlockStore + Clone> TipUpdater<S, D> {
    pub fn new(
        source: Arc<S>,
        writer: BatchWriter<D>,
        retry: RetryPolicy,
        blocks_per_request: u64,
        metrics: MirrorMetrics,
    ) -> Self {
        Self {
            heights: HeightSource::new(source.clone(), writer.store().clone(), retry),
            fetcher: BatchFetcher::new(source, retry),
            writer,
            blocks_per_request,
            metrics,
        }
    }

    /// The `blocks` heights ending at `remote`, never starting below 1.
    pub fn tip_range(remote: u64, blocks: u64) -> HeightRange {
        HeightRange::starting_at(remote.saturating_sub(blocks) + 1, blocks)
    }

    /// Fetch and write the `blocks` most recent heights. Requests are capped
    /// at `blocks_per_request` heights; a larger update is split and written
    /// in one unit of work. Returns the number of blocks fetched.
    #[instrument(skip(self))]
    pub async fn update(&self, blocks: u64) -> MirrorResult<u64> {
        let remote = self.heights.remote().await?;
        self.metrics.set_remote_height(remote);

        let range = Self::tip_range(remote, blocks);
        let fetched = self
            .writer
            .sync_range(&self.fetcher, range, self.blocks_per_request)
            .await?;
        self.metrics.record_stored(Phase::Update, fetched);
        if fetched > 0 {
            self.metrics.set_local_height(Some(range.start + fetched - 1));
        }
        debug!(%range, fetched, "Updated tip");
        Ok(fetched)
    }

    /// Update the `blocks` tip heights forever, pausing `throttle` after
    /// each cycle. A failed update is logged and does not end the loop.
    #[instrument(name = "plain_update", skip(self))]
    pub async fn run_plain(&self, blocks: u64, throttle: Duration) {
        info!("Starting plain update loop");
        loop {
            match self.update(blocks).await {
                Ok(_) => {
                    self.metrics.record_tick(true);
                    debug!("Finished update");
                }
                Err(err) => {
                    self.metrics.record_tick(false);
                    warn!(?err, "Failed update");
                }
            }
            sleep(throttle).await;
        }
    }
}

#[async_trait]
impl<S: BlockSource, D: BlockStore + Clone> TickHandler for TipUpdater<S, D> {
    async fn tick(&self, blocks: u64) -> MirrorResult<()> {
        self.update(blocks).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use crate::metrics::dummy_metrics;
    use crate::test_utils::{FakeNode, MemoryStore};
    use crate::types::ConflictPolicy;

    use super::*;

    fn updater(
        node: &Arc<FakeNode>,
        store: &MemoryStore,
        policy: ConflictPolicy,
    ) -> TipUpdater<FakeNode, MemoryStore> {
        updater_with_limit(node, store, policy, 100)
    }

    fn updater_with_limit(
        node: &Arc<FakeNode>,
        store: &MemoryStore,
        policy: ConflictPolicy,
        blocks_per_request: u64,
    ) -> TipUpdater<FakeNode, MemoryStore> {
        TipUpdater::new(
            node.clone(),
            BatchWriter::new(store.clone(), policy),
            RetryPolicy::none(),
            blocks_per_request,
            dummy_metrics(),
        )
    }

    #[test]
    fn tip_range_sizing() {
        assert_eq!(
            TipUpdater::<FakeNode, MemoryStore>::tip_range(500, 10),
            HeightRange::new(491, 500).unwrap()
        );
        assert_eq!(
            TipUpdater::<FakeNode, MemoryStore>::tip_range(3, 10),
            HeightRange::new(1, 10).unwrap()
        );
    }

    #[tokio::test]
    async fn update_fetches_tip_blocks() {
        let node = Arc::new(FakeNode::at_height(500));
        let store = MemoryStore::with_heights(1..=495);

        let fetched = updater(&node, &store, ConflictPolicy::Update)
            .update(10)
            .await
            .unwrap();

        assert_eq!(node.requests(), vec![HeightRange::new(491, 500).unwrap()]);
        assert_eq!(fetched, 10);
        // 491..=495 are unchanged
        assert_eq!(store.changed_rows(), 5);
        assert_eq!(store.heights(), (1..=500).collect_vec());
    }

    #[tokio::test]
    async fn forked_tip_is_overwritten() {
        let node = Arc::new(FakeNode::at_height(20));
        let store = MemoryStore::with_heights(1..=20);
        node.set_fork("fork-");

        updater(&node, &store, ConflictPolicy::Update)
            .update(2)
            .await
            .unwrap();

        assert_eq!(store.changed_rows(), 2);
        assert_eq!(store.payload(20).unwrap()["signature"], "fork-sig-20");
        assert_eq!(store.payload(18).unwrap()["signature"], "sig-18");
    }

    #[tokio::test]
    async fn large_tier_is_split_into_bounded_requests() {
        let node = Arc::new(FakeNode::at_height(1_000));
        let store = MemoryStore::with_heights(1..=900);

        let fetched = updater_with_limit(&node, &store, ConflictPolicy::Update, 50)
            .tick(100)
            .await;

        assert!(fetched.is_ok());
        let requests = node.requests();
        assert_eq!(
            requests,
            vec![
                HeightRange::new(901, 950).unwrap(),
                HeightRange::new(951, 1_000).unwrap()
            ]
        );
        assert!(requests.iter().all(|r| r.len() <= 50));
        assert_eq!(store.heights(), (1..=1_000).collect_vec());
        assert_eq!(store.units_committed(), 1);
    }

    #[tokio::test]
    async fn failing_height_request_fails_tick() {
        let node = Arc::new(FakeNode::at_height(20));
        node.fail_height(1);
        let store = MemoryStore::default();

        assert!(updater(&node, &store, ConflictPolicy::Update)
            .tick(2)
            .await
            .is_err());
        assert!(store.heights().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn plain_loop_survives_failures() {
        let node = Arc::new(FakeNode::at_height(20));
        node.fail_blocks(2);
        let store = MemoryStore::default();
        let updater = updater(&node, &store, ConflictPolicy::Update);

        let res = tokio::time::timeout(
            Duration::from_millis(2_500),
            updater.run_plain(5, Duration::from_secs(1)),
        )
        .await;

        assert!(res.is_err());
        assert_eq!(store.heights(), (16..=20).collect_vec());
    }
}
