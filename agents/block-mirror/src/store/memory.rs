use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{MirrorError, MirrorResult};
use crate::store::{BlockStore, StoreUnit};
use crate::types::{fingerprint_of, Block, ConflictPolicy};

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<u64, Value>,
    /// Number of upserts that actually changed a row, across all writes.
    changed_rows: u64,
    /// Fail the n-th call to `write_blocks` (1-based, counted across units).
    fail_on_write: Option<u64>,
    writes: u64,
    units_committed: u64,
}

/// In-memory `BlockStore` with the same conflict semantics as `MirrorDb`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore(Arc<Mutex<Inner>>);

impl MemoryStore {
    pub fn with_heights(heights: impl IntoIterator<Item = u64>) -> Self {
        let store = Self::default();
        {
            let mut inner = store.0.lock().unwrap();
            for h in heights {
                inner
                    .rows
                    .insert(h, serde_json::json!({ "height": h, "signature": format!("sig-{h}") }));
            }
        }
        store
    }

    pub fn fail_on_write(&self, n: u64) {
        self.0.lock().unwrap().fail_on_write = Some(n);
    }

    pub fn heights(&self) -> Vec<u64> {
        self.0.lock().unwrap().rows.keys().copied().collect()
    }

    pub fn payload(&self, height: u64) -> Option<Value> {
        self.0.lock().unwrap().rows.get(&height).cloned()
    }

    pub fn changed_rows(&self) -> u64 {
        self.0.lock().unwrap().changed_rows
    }

    pub fn units_committed(&self) -> u64 {
        self.0.lock().unwrap().units_committed
    }

    fn check_failure(inner: &mut Inner) -> MirrorResult<()> {
        inner.writes += 1;
        if inner.fail_on_write == Some(inner.writes) {
            return Err(MirrorError::Storage(sea_orm::DbErr::Custom(
                "injected write failure".into(),
            )));
        }
        Ok(())
    }
}

fn apply(rows: &mut BTreeMap<u64, Value>, blocks: &[Block], policy: ConflictPolicy) -> u64 {
    let mut changed = 0;
    for block in blocks {
        let write = match (rows.get(&block.height), policy) {
            (None, _) => true,
            (Some(_), ConflictPolicy::Nothing) => false,
            (Some(_), ConflictPolicy::UpdateForce) => true,
            (Some(stored), ConflictPolicy::Update) => {
                fingerprint_of(stored) != block.fingerprint()
            }
        };
        if write {
            rows.insert(block.height, block.payload.clone());
            changed += 1;
        }
    }
    changed
}

#[async_trait]
impl BlockStore for MemoryStore {
    type Unit = MemoryUnit;

    async fn max_height(&self) -> MirrorResult<Option<u64>> {
        Ok(self.0.lock().unwrap().rows.keys().next_back().copied())
    }

    async fn write_blocks(&self, blocks: &[Block], policy: ConflictPolicy) -> MirrorResult<u64> {
        let mut inner = self.0.lock().unwrap();
        Self::check_failure(&mut inner)?;
        let changed = apply(&mut inner.rows, blocks, policy);
        inner.changed_rows += changed;
        Ok(changed)
    }

    async fn begin_unit(&self) -> MirrorResult<MemoryUnit> {
        let staged = self.0.lock().unwrap().rows.clone();
        Ok(MemoryUnit {
            store: self.clone(),
            staged,
            changed: 0,
        })
    }

    async fn delete_from(&self, height: u64) -> MirrorResult<Vec<u64>> {
        let mut inner = self.0.lock().unwrap();
        let removed = inner.rows.split_off(&height);
        Ok(removed.into_keys().collect())
    }
}

/// Copy-on-begin unit; commit replaces the store's rows wholesale.
#[derive(Debug)]
pub struct MemoryUnit {
    store: MemoryStore,
    staged: BTreeMap<u64, Value>,
    changed: u64,
}

#[async_trait]
impl StoreUnit for MemoryUnit {
    async fn write_blocks(
        &mut self,
        blocks: &[Block],
        policy: ConflictPolicy,
    ) -> MirrorResult<u64> {
        MemoryStore::check_failure(&mut self.store.0.lock().unwrap())?;
        let changed = apply(&mut self.staged, blocks, policy);
        self.changed += changed;
        Ok(changed)
    }

    async fn commit(self) -> MirrorResult<()> {
        let mut inner = self.store.0.lock().unwrap();
        inner.rows = self.staged;
        inner.changed_rows += self.changed;
        inner.units_committed += 1;
        Ok(())
    }
}
