//! Catch-up loop: close the gap to the chain tip in bounded iterations.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::error::MirrorResult;
use crate::fetcher::BatchFetcher;
use crate::height::{HeightSource, Heights};
use crate::metrics::{MirrorMetrics, Phase};
use crate::node::{BlockSource, RetryPolicy};
use crate::settings::MirrorSettings;
use crate::store::BlockStore;
use crate::types::HeightRange;
use crate::writer::BatchWriter;

/// Sizing of catch-up work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchUpConf {
    pub blocks_per_request: u64,
    pub max_iteration_span: u64,
    /// A gap of at most this many heights counts as caught up.
    pub close_enough_threshold: u64,
    /// First height mirrored into an empty store.
    pub start_height: u64,
}

impl From<&MirrorSettings> for CatchUpConf {
    fn from(settings: &MirrorSettings) -> Self {
        Self {
            blocks_per_request: settings.blocks_per_request,
            max_iteration_span: settings.max_iteration_span,
            close_enough_threshold: settings.close_enough_threshold,
            start_height: settings.start_height,
        }
    }
}

impl CatchUpConf {
    /// The range the next iteration should sync, or `None` once the store
    /// is close enough to the tip.
    pub fn plan(&self, heights: Heights) -> Option<HeightRange> {
        let start = heights.local.map_or(self.start_height, |h| h + 1);
        let end = heights
            .remote
            .min(start + self.max_iteration_span.saturating_sub(1));
        HeightRange::new(start, end)
            .filter(|range| range.end - range.start > self.close_enough_threshold)
    }
}

/// Drives fetch and write until the store is close to the chain tip.
#[derive(Debug)]
pub struct CatchUp<S, D> {
    heights: HeightSource<S, D>,
    fetcher: BatchFetcher<S>,
    writer: BatchWriter<D>,
    conf: CatchUpConf,
    metrics: MirrorMetrics,
}

impl<S: BlockSource, D: BlockStore + Clone> CatchUp<S, D> {
    pub fn new(
        source: Arc<S>,
        writer: BatchWriter<D>,
        retry: RetryPolicy,
        conf: CatchUpConf,
        metrics: MirrorMetrics,
    ) -> Self {
        Self {
            heights: HeightSource::new(source.clone(), writer.store().clone(), retry),
            fetcher: BatchFetcher::new(source, retry),
            writer,
            conf,
            metrics,
        }
    }

    /// Run iterations until caught up. Any failed iteration ends the loop
    /// with that error; iterations committed before it stay committed.
    #[instrument(name = "catch_up", skip(self))]
    pub async fn run(&self) -> MirrorResult<()> {
        let mut iterations = 0u64;
        while let Some(range) = self.iteration().await? {
            iterations += 1;
            debug!(iterations, %range, "Catch-up iteration complete");
        }
        info!(iterations, "Caught up with chain tip");
        Ok(())
    }

    /// Compare heights and sync one bounded range. Returns the planned range,
    /// or `None` when there is nothing (worth) syncing.
    pub async fn iteration(&self) -> MirrorResult<Option<HeightRange>> {
        let heights = self.heights.both().await?;
        self.metrics.set_local_height(heights.local);
        self.metrics.set_remote_height(heights.remote);

        let Some(range) = self.conf.plan(heights) else {
            debug!(?heights, "Close enough to chain tip");
            return Ok(None);
        };

        info!(%range, remote = heights.remote, "Syncing blocks");
        let fetched = self
            .writer
            .sync_range(&self.fetcher, range, self.conf.blocks_per_request)
            .await?;
        self.metrics.record_stored(Phase::CatchUp, fetched);
        if fetched == 0 {
            warn!(%range, "Node returned no blocks below its reported height");
            return Ok(None);
        }
        Ok(Some(range))
    }
}
