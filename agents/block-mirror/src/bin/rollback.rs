//! Delete every stored block at or above a height.
//!
//! `rollback <height>`

use block_mirror::db::MirrorDb;
use block_mirror::settings::MirrorSettings;
use block_mirror::store::BlockStore;
use clap::Parser;
use eyre::Result;
use tracing::info;

#[derive(Debug, Parser)]
#[command(about = "Delete blocks at or above a height")]
struct Args {
    height: u64,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    #[cfg(feature = "color-eyre")]
    color_eyre::install()?;

    let args = Args::parse();
    let settings = MirrorSettings::load()?;
    settings.tracing.start_tracing()?;

    let db = MirrorDb::connect(&settings.db).await?;
    let deleted = db.delete_from(args.height).await?;
    info!(from = args.height, count = deleted.len(), "Rolled back blocks");
    println!("{deleted:?}");
    Ok(())
}
