//! Local and remote chain heights.

use std::sync::Arc;

use derive_new::new;
use tracing::{instrument, trace};

use crate::error::MirrorResult;
use crate::node::{BlockSource, RetryPolicy};
use crate::store::BlockStore;

/// Snapshot of the remote tip and the local sync cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heights {
    pub remote: u64,
    /// `None` while the store is empty.
    pub local: Option<u64>,
}

/// Reads the sync cursor from the store and the chain height from the node.
#[derive(Debug, new)]
pub struct HeightSource<S, D> {
    source: Arc<S>,
    store: D,
    retry: RetryPolicy,
}

impl<S: BlockSource, D: BlockStore> HeightSource<S, D> {
    /// Highest stored height, recomputed from the store on every call.
    pub async fn local(&self) -> MirrorResult<Option<u64>> {
        self.store.max_height().await
    }

    pub async fn remote(&self) -> MirrorResult<u64> {
        self.retry
            .call("fetch_height", || self.source.height())
            .await
    }

    /// Read both heights concurrently.
    #[instrument(skip(self), level = "trace")]
    pub async fn both(&self) -> MirrorResult<Heights> {
        let (remote, local) = tokio::try_join!(self.remote(), self.local())?;
        trace!(remote, ?local, "Read heights");
        Ok(Heights { remote, local })
    }

    pub fn store(&self) -> &D {
        &self.store
    }
}
