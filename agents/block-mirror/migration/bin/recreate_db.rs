//! Drop every table and re-apply all migrations. Destroys mirrored data.

use common::*;

mod common;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), DbErr> {
    let db = init().await?;

    Migrator::fresh(&db).await?;

    Ok(())
}
