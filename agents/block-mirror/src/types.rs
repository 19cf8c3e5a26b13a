use std::fmt;

use serde::Deserialize;
use serde_json::Value;

/// Payload field used as the content fingerprint of a block.
pub const FINGERPRINT_FIELD: &str = "signature";

/// A mirrored block. The payload is kept verbatim; only `height` is
/// interpreted by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub height: u64,
    pub payload: Value,
}

impl Block {
    pub fn new(height: u64, payload: Value) -> Self {
        Self { height, payload }
    }

    /// Stable content fingerprint used by the `update` conflict policy.
    pub fn fingerprint(&self) -> Option<&str> {
        fingerprint_of(&self.payload)
    }
}

pub fn fingerprint_of(payload: &Value) -> Option<&str> {
    payload.get(FINGERPRINT_FIELD).and_then(Value::as_str)
}

/// Inclusive height interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightRange {
    pub start: u64,
    pub end: u64,
}

impl HeightRange {
    /// Returns `None` when `start > end`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Range of `len` heights beginning at `start`; a zero `len` still
    /// covers `start` itself.
    pub fn starting_at(start: u64, len: u64) -> Self {
        Self {
            start,
            end: start + len.saturating_sub(1),
        }
    }

    /// Number of heights covered. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Split into consecutive, non-overlapping chunks of at most `size`
    /// heights each.
    pub fn chunks(&self, size: u64) -> impl Iterator<Item = HeightRange> + '_ {
        let size = size.max(1);
        let end = self.end;
        (self.start..=end)
            .step_by(size as usize)
            .map(move |start| HeightRange {
                start,
                end: end.min(start + size - 1),
            })
    }
}

impl fmt::Display for HeightRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// What a write does when it hits a height that is already stored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    /// Overwrite only if the content fingerprint changed.
    #[default]
    Update,
    /// Always overwrite.
    UpdateForce,
    /// Keep the stored row.
    Nothing,
}

/// One cadence of the adaptive update scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UpdateTier {
    /// Firing interval in milliseconds.
    pub interval: u64,
    /// Number of tip blocks requested when this tier fires.
    pub blocks: u64,
}
