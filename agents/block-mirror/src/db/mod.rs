use std::sync::Arc;

use eyre::Result;
use sea_orm::{Database, DbConn};
use tracing::instrument;

#[allow(clippy::all)]
mod generated;

// implements BlockStore for MirrorDb
mod block;

pub use block::DbUnit;

/// Postgres-backed block store. Clones share one connection pool.
#[derive(Clone, Debug)]
pub struct MirrorDb(Arc<DbConn>);

impl MirrorDb {
    #[instrument(skip(url))]
    pub async fn connect(url: &str) -> Result<Self> {
        let db = Database::connect(url).await?;
        Ok(Self::with_connection(db))
    }

    pub fn with_connection(db: DbConn) -> Self {
        Self(Arc::new(db))
    }
}
