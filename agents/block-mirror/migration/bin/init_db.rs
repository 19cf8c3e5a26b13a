//! Create the `blocks_raw` schema in the mirror database. Migrations that
//! are already recorded are skipped, so rerunning it is harmless.

use common::*;

mod common;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), DbErr> {
    let db = init().await?;

    let pending = Migrator::get_pending_migrations(&db).await?;
    if pending.is_empty() {
        tracing::info!("Mirror schema is up to date");
        return Ok(());
    }
    for migration in &pending {
        tracing::info!(migration = migration.name(), "Applying migration");
    }
    Migrator::up(&db, None).await?;
    tracing::info!(applied = pending.len(), "Mirror schema ready");

    Ok(())
}
