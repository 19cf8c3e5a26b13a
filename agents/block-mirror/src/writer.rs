//! Batch writer: fetch + write of one unit of work.

use derive_new::new;
use tracing::{debug, instrument};

use crate::error::MirrorResult;
use crate::fetcher::BatchFetcher;
use crate::node::BlockSource;
use crate::store::{BlockStore, StoreUnit};
use crate::types::{Block, ConflictPolicy, HeightRange};

/// Writes decoded blocks into a [`BlockStore`] with a fixed conflict policy.
#[derive(Debug, Clone, new)]
pub struct BatchWriter<D> {
    store: D,
    policy: ConflictPolicy,
}

impl<D: BlockStore> BatchWriter<D> {
    pub fn store(&self) -> &D {
        &self.store
    }

    /// Upsert one batch atomically. Returns the number of rows changed.
    pub async fn write(&self, blocks: &[Block]) -> MirrorResult<u64> {
        self.store.write_blocks(blocks, self.policy).await
    }

    /// Fetch `range` in chunks of `chunk_size` heights and write them.
    ///
    /// A range that needs more than one chunk is written inside a single
    /// unit of work, so either every chunk is committed or none is. A range
    /// covered by one chunk is written directly. Returns the number of
    /// blocks fetched.
    #[instrument(skip_all, fields(%range, policy = ?self.policy))]
    pub async fn sync_range<S: BlockSource>(
        &self,
        fetcher: &BatchFetcher<S>,
        range: HeightRange,
        chunk_size: u64,
    ) -> MirrorResult<u64> {
        if range.len() <= chunk_size {
            let blocks = fetcher.fetch(range).await?;
            let changed = self.write(&blocks).await?;
            debug!(fetched = blocks.len(), changed, "Synced range");
            return Ok(blocks.len() as u64);
        }

        let mut unit = self.store.begin_unit().await?;
        let mut fetched = 0;
        let mut changed = 0;
        for chunk in range.chunks(chunk_size) {
            let blocks = fetcher.fetch(chunk).await?;
            changed += unit.write_blocks(&blocks, self.policy).await?;
            fetched += blocks.len() as u64;
            // the node has nothing past its tip
            if (blocks.len() as u64) < chunk.len() {
                break;
            }
        }
        unit.commit().await?;
        debug!(fetched, changed, "Synced range");
        Ok(fetched)
    }
}
