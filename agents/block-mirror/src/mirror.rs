//! Process wiring of the mirror agent.

use std::sync::Arc;

use eyre::{eyre, Result};
use futures::future::select_all;
use prometheus::Registry;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

use crate::catch_up::{CatchUp, CatchUpConf};
use crate::db::MirrorDb;
use crate::metrics::MirrorMetrics;
use crate::node::NodeClient;
use crate::reorg::ReorgMonitor;
use crate::scheduler::UpdateScheduler;
use crate::server::Server;
use crate::settings::MirrorSettings;
use crate::update::TipUpdater;
use crate::writer::BatchWriter;

/// How tip updates run once catch-up is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// The adaptive multi-tier scheduler.
    Tiered,
    /// Back-to-back updates of `blocksPerUpdate` blocks.
    Plain,
}

/// The assembled mirror: node client, store and metrics.
#[derive(Debug)]
pub struct BlockMirror {
    settings: MirrorSettings,
    node: Arc<NodeClient>,
    db: MirrorDb,
    metrics: MirrorMetrics,
}

impl BlockMirror {
    pub async fn from_settings(settings: MirrorSettings) -> Result<Self> {
        let node = Arc::new(NodeClient::new(&settings.node)?);
        let db = MirrorDb::connect(&settings.db).await?;
        let metrics = MirrorMetrics::new(Registry::new())?;
        Ok(Self {
            settings,
            node,
            db,
            metrics,
        })
    }

    /// Run until one of the long-lived tasks ends, then stop the others.
    pub async fn run(self, mode: UpdateMode) -> Result<()> {
        let mut tasks: Vec<JoinHandle<Result<()>>> = vec![];

        if let Some(port) = self.settings.metrics_port {
            tasks.push(Server::new(port, self.metrics.clone()).run());
        }
        tasks.push(self.ingest(mode));
        tasks.push(self.reorg_monitor());

        let (res, _, remaining) = select_all(tasks).await;
        for task in remaining {
            task.abort();
        }
        match res {
            Ok(Ok(())) => Err(eyre!("A mirror task exited unexpectedly")),
            Ok(Err(err)) => {
                error!(?err, "A mirror task failed");
                Err(err)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Catch up, then follow the tip forever.
    fn ingest(&self, mode: UpdateMode) -> JoinHandle<Result<()>> {
        let settings = self.settings.clone();
        let retry = settings.node.retry_policy();
        let writer = BatchWriter::new(self.db.clone(), settings.on_conflict);
        let catch_up = CatchUp::new(
            self.node.clone(),
            writer.clone(),
            retry,
            CatchUpConf::from(&settings),
            self.metrics.clone(),
        );
        let updater = TipUpdater::new(
            self.node.clone(),
            writer,
            retry,
            settings.blocks_per_request,
            self.metrics.clone(),
        );
        let metrics = self.metrics.clone();

        tokio::spawn(
            async move {
                catch_up.run().await?;
                match mode {
                    UpdateMode::Tiered => {
                        UpdateScheduler::new(settings.update_strategy, updater, metrics)?
                            .run()
                            .await
                    }
                    UpdateMode::Plain => {
                        updater
                            .run_plain(settings.blocks_per_update, settings.plain_update_interval)
                            .await
                    }
                }
                Ok::<(), eyre::Report>(())
            }
            .instrument(info_span!("ingest")),
        )
    }

    fn reorg_monitor(&self) -> JoinHandle<Result<()>> {
        let monitor = ReorgMonitor::new(
            self.node.clone(),
            self.db.clone(),
            self.settings.node.retry_policy(),
            self.settings.rollback_monitor_interval,
            self.metrics.clone(),
        );
        tokio::spawn(async move {
            monitor.run().await;
            Ok(())
        })
    }
}

/// Entry point shared by the agent binary.
pub async fn mirror_main(mode: UpdateMode) -> Result<()> {
    #[cfg(feature = "color-eyre")]
    color_eyre::install()?;

    let settings = MirrorSettings::load()?;
    settings.tracing.start_tracing()?;
    info!(?mode, node = %settings.node.url, "Starting block mirror");

    BlockMirror::from_settings(settings).await?.run(mode).await
}
