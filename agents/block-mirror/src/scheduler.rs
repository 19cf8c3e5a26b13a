//! Adaptive multi-tier update scheduler.
//!
//! Every tier fires immediately and then once per interval, asking for its
//! block count. Signals are collected over a window of half the smallest
//! interval; at the end of a window the largest request wins and is queued
//! as one update cycle. Cycles run one at a time, each bounded by the
//! largest tier interval.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{eyre, Result};
use futures::future::join_all;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{MirrorError, MirrorResult};
use crate::metrics::MirrorMetrics;
use crate::types::UpdateTier;

/// One update cycle for the `blocks` most recent heights.
#[async_trait]
pub trait TickHandler: Send + Sync + Debug {
    async fn tick(&self, blocks: u64) -> MirrorResult<()>;
}

#[derive(Debug)]
pub struct UpdateScheduler<H> {
    tiers: Vec<UpdateTier>,
    window: Duration,
    cycle_timeout: Duration,
    handler: H,
    metrics: MirrorMetrics,
}

impl<H: TickHandler> UpdateScheduler<H> {
    pub fn new(tiers: Vec<UpdateTier>, handler: H, metrics: MirrorMetrics) -> Result<Self> {
        let min = tiers.iter().map(|t| t.interval).min();
        let max = tiers.iter().map(|t| t.interval).max();
        let (Some(min), Some(max)) = (min, max) else {
            return Err(eyre!("Update scheduler needs at least one tier"));
        };
        Ok(Self {
            tiers,
            window: Duration::from_millis((min / 2).max(1)),
            cycle_timeout: Duration::from_millis(max),
            handler,
            metrics,
        })
    }

    /// Length of the buffering window.
    #[cfg(test)]
    pub(crate) fn window(&self) -> Duration {
        self.window
    }

    /// Time budget of one update cycle.
    #[cfg(test)]
    pub(crate) fn cycle_timeout(&self) -> Duration {
        self.cycle_timeout
    }

    /// Run forever.
    #[instrument(name = "update_scheduler", skip(self), fields(tiers = self.tiers.len()))]
    pub async fn run(&self) {
        info!(window = ?self.window, cycle_timeout = ?self.cycle_timeout, "Starting update scheduler");
        let (signal_tx, signal_rx) = unbounded_channel();
        let (work_tx, work_rx) = unbounded_channel();

        let tiers = join_all(
            self.tiers
                .iter()
                .map(|tier| fire_tier(*tier, signal_tx.clone())),
        );
        tokio::join!(
            tiers,
            self.coalesce(signal_rx, work_tx),
            self.work(work_rx)
        );
    }

    /// Reduce the signals of each window to their maximum and queue it.
    async fn coalesce(&self, mut signals: UnboundedReceiver<u64>, work: UnboundedSender<u64>) {
        let mut windows = interval_at(Instant::now() + self.window, self.window);
        windows.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            windows.tick().await;
            let mut largest = None;
            while let Ok(blocks) = signals.try_recv() {
                largest = largest.max(Some(blocks));
            }
            if let Some(blocks) = largest {
                trace!(blocks, "Window closed");
                if work.send(blocks).is_err() {
                    return;
                }
            }
        }
    }

    async fn work(&self, mut queue: UnboundedReceiver<u64>) {
        while let Some(blocks) = queue.recv().await {
            let outcome = match timeout(self.cycle_timeout, self.handler.tick(blocks)).await {
                Ok(res) => res,
                Err(_) => Err(MirrorError::Timeout(self.cycle_timeout)),
            };
            self.metrics.record_tick(outcome.is_ok());
            match outcome {
                Ok(()) => debug!(blocks, "Finished update"),
                Err(err) => warn!(?err, blocks, "Failed update"),
            }
        }
    }
}

async fn fire_tier(tier: UpdateTier, signals: UnboundedSender<u64>) {
    let mut ticks = interval(Duration::from_millis(tier.interval));
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticks.tick().await;
        if signals.send(tier.blocks).is_err() {
            return;
        }
    }
}
