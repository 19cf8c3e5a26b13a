//! Batch fetcher: one bounded range request, decoded into blocks.

use std::sync::Arc;

use derive_new::new;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::decoder::decode_blocks;
use crate::error::{MirrorError, MirrorResult};
use crate::node::{BlockSource, RetryPolicy};
use crate::types::{Block, HeightRange};

/// Fetches and decodes block ranges from a [`BlockSource`].
///
/// Heights are assigned by position: the node returns a gapless, ordered
/// run of blocks beginning at the requested start height, so the n-th
/// decoded object is block `start + n`. A block payload that carries its own
/// `height` must agree with its position, otherwise the whole batch is
/// rejected.
#[derive(Debug, new)]
pub struct BatchFetcher<S> {
    source: Arc<S>,
    retry: RetryPolicy,
}

impl<S: BlockSource> BatchFetcher<S> {
    /// Fetch `range`. The node may return fewer blocks than requested when
    /// the range reaches past its tip.
    #[instrument(skip_all, fields(%range), err)]
    pub async fn fetch(&self, range: HeightRange) -> MirrorResult<Vec<Block>> {
        let body = self
            .retry
            .call("fetch_blocks", || {
                self.source.blocks_raw(range.start, range.end)
            })
            .await?;
        let payloads = decode_blocks(&body)?;
        if payloads.len() as u64 > range.len() {
            return Err(MirrorError::Protocol(format!(
                "node returned {} blocks for {range}",
                payloads.len()
            )));
        }

        let blocks = payloads
            .into_iter()
            .zip(range.start..)
            .map(|(payload, height)| assign_height(height, payload))
            .collect::<MirrorResult<Vec<_>>>()?;
        debug!(fetched = blocks.len(), "Fetched blocks");
        Ok(blocks)
    }
}

fn assign_height(height: u64, payload: Value) -> MirrorResult<Block> {
    match payload.get("height") {
        None => {}
        Some(claimed) if claimed.as_u64() == Some(height) => {}
        Some(claimed) => {
            return Err(MirrorError::Protocol(format!(
                "block at position {height} claims height {claimed}"
            )))
        }
    }
    Ok(Block::new(height, payload))
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;
    use std::time::Duration;

    use async_trait::async_trait;
    use itertools::Itertools;
    use serde_json::json;

    use super::*;

    mockall::mock! {
        pub Node {}

        impl Debug for Node {
            fn fmt<'a>(&self, f: &mut std::fmt::Formatter<'a>) -> std::fmt::Result;
        }

        #[async_trait]
        impl BlockSource for Node {
            async fn height(&self) -> MirrorResult<u64>;
            async fn blocks_raw(&self, start: u64, end: u64) -> MirrorResult<String>;
        }
    }

    fn fetcher(node: MockNode, retries: u32) -> BatchFetcher<MockNode> {
        BatchFetcher::new(
            Arc::new(node),
            RetryPolicy::new(retries, Duration::from_millis(10)),
        )
    }

    fn range(start: u64, end: u64) -> HeightRange {
        HeightRange::new(start, end).unwrap()
    }

    #[tokio::test]
    async fn heights_are_assigned_by_position() {
        let mut node = MockNode::new();
        node.expect_blocks_raw()
            .withf(|start, end| *start == 10 && *end == 12)
            .times(1)
            .returning(|_, _| {
                Ok(r#"{"signature":"a"},{"signature":"b"},{"signature":"c"}"#.to_owned())
            });

        let blocks = fetcher(node, 0).fetch(range(10, 12)).await.unwrap();
        assert_eq!(
            blocks.iter().map(|b| b.height).collect_vec(),
            vec![10, 11, 12]
        );
        assert_eq!(blocks[1].payload, json!({ "signature": "b" }));
    }

    #[tokio::test]
    async fn short_response_near_tip_is_accepted() {
        let mut node = MockNode::new();
        node.expect_blocks_raw()
            .returning(|_, _| Ok(r#"{"height":5},{"height":6}"#.to_owned()));

        let blocks = fetcher(node, 0).fetch(range(5, 9)).await.unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].height, 6);
    }

    #[tokio::test]
    async fn mismatched_height_is_a_protocol_error() {
        let mut node = MockNode::new();
        node.expect_blocks_raw()
            .times(1)
            .returning(|_, _| Ok(r#"{"height":5},{"height":7}"#.to_owned()));

        let err = fetcher(node, 3).fetch(range(5, 6)).await.unwrap_err();
        assert!(matches!(err, MirrorError::Protocol(_)), "{err}");
    }

    #[tokio::test]
    async fn oversized_response_is_a_protocol_error() {
        let mut node = MockNode::new();
        node.expect_blocks_raw()
            .returning(|_, _| Ok(r#"{"height":1},{"height":2},{"height":3}"#.to_owned()));

        let err = fetcher(node, 0).fetch(range(1, 2)).await.unwrap_err();
        assert!(matches!(err, MirrorError::Protocol(_)), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let mut node = MockNode::new();
        let mut seq = mockall::Sequence::new();
        node.expect_blocks_raw()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(MirrorError::Network("connection reset".into())));
        node.expect_blocks_raw()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(r#"{"height":1}"#.to_owned()));

        let blocks = fetcher(node, 2).fetch(range(1, 1)).await.unwrap();
        assert_eq!(blocks.len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_is_not_retried() {
        let mut node = MockNode::new();
        node.expect_blocks_raw()
            .times(1)
            .returning(|_, _| Ok(r#"{"height":1,}"#.to_owned()));

        let err = fetcher(node, 5).fetch(range(1, 1)).await.unwrap_err();
        assert!(matches!(err, MirrorError::Protocol(_)), "{err}");
    }

    #[tokio::test]
    async fn big_integers_survive_fetch() {
        let mut node = MockNode::new();
        node.expect_blocks_raw().returning(|_, _| {
            Ok(r#"{"height":1,"reward":123456789012345678901234567890}"#.to_owned())
        });

        let blocks = fetcher(node, 0).fetch(range(1, 1)).await.unwrap();
        assert_eq!(
            blocks[0].payload["reward"].to_string(),
            "123456789012345678901234567890"
        );
    }
}
