//! Abstraction over the relational store holding mirrored blocks.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::MirrorResult;
use crate::types::{Block, ConflictPolicy};

#[cfg(test)]
pub(crate) mod memory;

/// Transactional store of `blocks_raw` rows.
#[async_trait]
pub trait BlockStore: Send + Sync + Debug {
    /// A set of writes published atomically by [`StoreUnit::commit`].
    type Unit: StoreUnit;

    /// Highest stored height, the sync cursor. `None` for an empty store.
    async fn max_height(&self) -> MirrorResult<Option<u64>>;

    /// Upsert a batch atomically, outside of any explicit unit of work.
    /// Returns the number of rows inserted or changed.
    async fn write_blocks(&self, blocks: &[Block], policy: ConflictPolicy) -> MirrorResult<u64>;

    /// Open a unit of work spanning several batches.
    async fn begin_unit(&self) -> MirrorResult<Self::Unit>;

    /// Delete every block at or above `height`, returning the deleted heights
    /// in ascending order.
    async fn delete_from(&self, height: u64) -> MirrorResult<Vec<u64>>;
}

/// Staged writes that become visible together on commit. Dropping a unit
/// without committing discards its writes.
#[async_trait]
pub trait StoreUnit: Send {
    async fn write_blocks(&mut self, blocks: &[Block], policy: ConflictPolicy)
        -> MirrorResult<u64>;

    async fn commit(self) -> MirrorResult<()>;
}
