use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use prometheus::{
    labels, opts, register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Registry,
};

const NAMESPACE: &str = "block_mirror";

/// Macro to prefix a string with the namespace.
macro_rules! namespaced {
    ($name:expr) => {
        format!("{}_{}", NAMESPACE, $name)
    };
}

/// Which activity stored a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CatchUp,
    Update,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::CatchUp => "catch_up",
            Phase::Update => "update",
        }
    }
}

/// Pipeline metrics, cheap to clone and share between tasks.
#[derive(Clone)]
pub struct MirrorMetrics {
    registry: Registry,
    local_height: IntGauge,
    remote_height: IntGauge,
    stored_blocks: IntCounterVec,
    update_ticks: IntCounterVec,
    rolled_back_blocks: IntCounter,
}

impl MirrorMetrics {
    pub fn new(registry: Registry) -> prometheus::Result<Self> {
        let const_labels: HashMap<String, String> = labels! {
            namespaced!("version") => env!("CARGO_PKG_VERSION").into(),
        };
        let const_labels_ref = const_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<HashMap<_, _>>();

        let local_height = register_int_gauge_with_registry!(
            opts!(
                namespaced!("local_height"),
                "Highest block height stored locally",
                const_labels_ref
            ),
            registry
        )?;
        let remote_height = register_int_gauge_with_registry!(
            opts!(
                namespaced!("remote_height"),
                "Chain height last reported by the node",
                const_labels_ref
            ),
            registry
        )?;
        let stored_blocks = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("stored_blocks"),
                "Number of blocks fetched and written, by activity",
                const_labels_ref
            ),
            &["phase"],
            registry
        )?;
        let update_ticks = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("update_ticks"),
                "Number of scheduled update cycles, by outcome",
                const_labels_ref
            ),
            &["outcome"],
            registry
        )?;
        let rolled_back_blocks = register_int_counter_with_registry!(
            opts!(
                namespaced!("rolled_back_blocks"),
                "Number of blocks deleted after the chain height regressed",
                const_labels_ref
            ),
            registry
        )?;

        Ok(Self {
            registry,
            local_height,
            remote_height,
            stored_blocks,
            update_ticks,
            rolled_back_blocks,
        })
    }

    pub fn set_local_height(&self, height: Option<u64>) {
        self.local_height.set(height.unwrap_or_default() as i64);
    }

    pub fn set_remote_height(&self, height: u64) {
        self.remote_height.set(height as i64);
    }

    pub fn record_stored(&self, phase: Phase, blocks: u64) {
        self.stored_blocks
            .with_label_values(&[phase.as_str()])
            .inc_by(blocks);
    }

    #[cfg(test)]
    pub(crate) fn stored(&self, phase: Phase) -> u64 {
        self.stored_blocks.with_label_values(&[phase.as_str()]).get()
    }

    pub fn record_tick(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.update_ticks.with_label_values(&[outcome]).inc();
    }

    #[cfg(test)]
    pub(crate) fn ticks(&self, success: bool) -> u64 {
        let outcome = if success { "success" } else { "failure" };
        self.update_ticks.with_label_values(&[outcome]).get()
    }

    pub fn record_rollback(&self, blocks: u64) {
        self.rolled_back_blocks.inc_by(blocks);
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics
    /// format) report.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 16);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }
}

impl Debug for MirrorMetrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorMetrics")
            .field("local_height", &self.local_height.get())
            .field("remote_height", &self.remote_height.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn dummy_metrics() -> MirrorMetrics {
    MirrorMetrics::new(Registry::new()).unwrap()
}
