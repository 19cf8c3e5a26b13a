use std::sync::Mutex;

use async_trait::async_trait;
use itertools::Itertools;
use serde_json::json;

use crate::error::{MirrorError, MirrorResult};
use crate::node::BlockSource;
use crate::types::HeightRange;

pub use crate::store::memory::MemoryStore;

#[derive(Debug, Default)]
struct FakeNodeState {
    height: u64,
    requests: Vec<HeightRange>,
    height_failures: u32,
    block_failures: u32,
    /// Prefixed to every signature, to simulate a fork with new content.
    fork: String,
}

/// Node serving synthetic blocks `1..=height`, concatenated back-to-back.
#[derive(Debug, Default)]
pub struct FakeNode(Mutex<FakeNodeState>);

impl FakeNode {
    pub fn at_height(height: u64) -> Self {
        let node = Self::default();
        node.set_height(height);
        node
    }

    pub fn set_height(&self, height: u64) {
        self.0.lock().unwrap().height = height;
    }

    pub fn set_fork(&self, fork: &str) {
        self.0.lock().unwrap().fork = fork.to_owned();
    }

    /// Fail the next `n` height requests with a network error.
    pub fn fail_height(&self, n: u32) {
        self.0.lock().unwrap().height_failures = n;
    }

    /// Fail the next `n` block requests with a network error.
    pub fn fail_blocks(&self, n: u32) {
        self.0.lock().unwrap().block_failures = n;
    }

    pub fn requests(&self) -> Vec<HeightRange> {
        self.0.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl BlockSource for FakeNode {
    async fn height(&self) -> MirrorResult<u64> {
        let mut state = self.0.lock().unwrap();
        if state.height_failures > 0 {
            state.height_failures -= 1;
            return Err(MirrorError::Network("node unavailable".into()));
        }
        Ok(state.height)
    }

    async fn blocks_raw(&self, start: u64, end: u64) -> MirrorResult<String> {
        let mut state = self.0.lock().unwrap();
        if state.block_failures > 0 {
            state.block_failures -= 1;
            return Err(MirrorError::Network("node unavailable".into()));
        }
        if let Some(range) = HeightRange::new(start, end) {
            state.requests.push(range);
        }
        let body = (start..=end.min(state.height))
            .map(|h| {
                json!({
                    "height": h,
                    "signature": format!("{}sig-{h}", state.fork),
                    "transactions": [{ "note": "{not a brace}" }],
                })
                .to_string()
            })
            .join("");
        Ok(body)
    }
}
