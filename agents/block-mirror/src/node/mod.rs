//! Access to the remote node.

use std::fmt::Debug;

use async_trait::async_trait;

pub use http::NodeClient;
pub use retry::RetryPolicy;

use crate::error::MirrorResult;

mod http;
mod retry;

/// The two node endpoints the pipeline depends on.
#[async_trait]
pub trait BlockSource: Send + Sync + Debug {
    /// Current chain height as reported by the node.
    async fn height(&self) -> MirrorResult<u64>;

    /// Raw body of the batch endpoint for the inclusive range
    /// `[start, end]`. The node guarantees the returned blocks are gapless
    /// and ordered, starting at `start`; it may return fewer blocks than
    /// requested near its tip.
    async fn blocks_raw(&self, start: u64, end: u64) -> MirrorResult<String>;
}
