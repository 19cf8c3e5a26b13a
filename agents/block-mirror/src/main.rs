//! The block mirror agent.

#![forbid(unsafe_code)]

use block_mirror::mirror::{mirror_main, UpdateMode};
use clap::Parser;
use eyre::Result;

#[derive(Debug, Parser)]
#[command(version, about = "Mirror chain blocks into Postgres")]
struct Args {
    /// Follow the tip with back-to-back updates of `blocksPerUpdate` blocks
    /// instead of the tiered update strategy.
    #[arg(long)]
    plain: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    // Logging is not initialised at this point, so, using `println!`
    println!("Block mirror starting up...");

    let args = Args::parse();
    let mode = if args.plain {
        UpdateMode::Plain
    } else {
        UpdateMode::Tiered
    };
    mirror_main(mode).await
}
