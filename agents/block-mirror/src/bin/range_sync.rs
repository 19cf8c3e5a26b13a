//! Fetch and store an explicit height range in one unit of work.
//!
//! `range_sync <start> <end> [--force]`

use std::sync::Arc;

use block_mirror::db::MirrorDb;
use block_mirror::fetcher::BatchFetcher;
use block_mirror::node::NodeClient;
use block_mirror::settings::MirrorSettings;
use block_mirror::types::{ConflictPolicy, HeightRange};
use block_mirror::writer::BatchWriter;
use clap::Parser;
use eyre::{eyre, Result};
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Parser)]
#[command(about = "Fetch and store blocks start..=end")]
struct Args {
    start: u64,
    end: u64,
    /// Overwrite stored blocks even when their content is unchanged.
    #[arg(long)]
    force: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    #[cfg(feature = "color-eyre")]
    color_eyre::install()?;

    let args = Args::parse();
    let range = HeightRange::new(args.start, args.end).ok_or_else(|| {
        eyre!(
            "Invalid height range {}..={}: start must not exceed end",
            args.start,
            args.end
        )
    })?;

    let settings = MirrorSettings::load()?;
    settings.tracing.start_tracing()?;

    let policy = if args.force {
        ConflictPolicy::UpdateForce
    } else {
        settings.on_conflict
    };
    let node = Arc::new(NodeClient::new(&settings.node)?);
    let db = MirrorDb::connect(&settings.db).await?;
    let fetcher = BatchFetcher::new(node, settings.node.retry_policy());
    let writer = BatchWriter::new(db, policy);

    let started = Instant::now();
    let fetched = writer
        .sync_range(&fetcher, range, settings.blocks_per_request)
        .await?;
    info!(
        %range,
        ?policy,
        fetched,
        batches = range.chunks(settings.blocks_per_request).count(),
        elapsed = ?started.elapsed(),
        "Range sync committed"
    );
    Ok(())
}
