use async_trait::async_trait;
use itertools::Itertools;
use migration::OnConflict;
use sea_orm::{
    sea_query::Expr, ActiveValue::*, ConnectionTrait, DatabaseTransaction, DbBackend,
    Insert, Statement, TransactionTrait,
};
use tracing::{debug, instrument, trace};

use crate::db::generated::blocks_raw;
use crate::db::MirrorDb;
use crate::error::MirrorResult;
use crate::store::{BlockStore, StoreUnit};
use crate::types::{Block, ConflictPolicy};

const MAX_HEIGHT_SQL: &str = "SELECT height FROM blocks_raw ORDER BY height DESC LIMIT 1";
const DELETE_FROM_SQL: &str = "DELETE FROM blocks_raw WHERE height >= $1 RETURNING height";
/// The stored row is only replaced when the block signature changed.
const SIGNATURE_CHANGED: &str =
    "\"blocks_raw\".\"b\"->>'signature' IS DISTINCT FROM \"excluded\".\"b\"->>'signature'";

impl MirrorDb {
    /// Each row binds two parameters and Postgres allows at most `u16::MAX`
    /// parameters per statement.
    const STORE_BLOCK_CHUNK_SIZE: usize = 30_000;

    fn on_conflict(policy: ConflictPolicy) -> OnConflict {
        match policy {
            ConflictPolicy::Update => OnConflict::column(blocks_raw::Column::Height)
                .update_column(blocks_raw::Column::B)
                .action_and_where(Expr::cust(SIGNATURE_CHANGED))
                .to_owned(),
            ConflictPolicy::UpdateForce => OnConflict::column(blocks_raw::Column::Height)
                .update_column(blocks_raw::Column::B)
                .to_owned(),
            ConflictPolicy::Nothing => OnConflict::column(blocks_raw::Column::Height)
                .do_nothing()
                .to_owned(),
        }
    }

    /// Upsert `blocks` through `conn`, split into statements small enough for
    /// the bind-parameter limit. Returns the number of rows written.
    async fn upsert_blocks<C: ConnectionTrait>(
        conn: &C,
        blocks: &[Block],
        policy: ConflictPolicy,
    ) -> MirrorResult<u64> {
        let mut written = 0;
        for chunk in blocks.chunks(Self::STORE_BLOCK_CHUNK_SIZE) {
            let models = chunk
                .iter()
                .map(|block| blocks_raw::ActiveModel {
                    height: Set(block.height as i64),
                    b: Set(block.payload.clone()),
                })
                .collect_vec();
            trace!(first = chunk[0].height, rows = models.len(), "Upserting blocks");
            written += Insert::many(models)
                .on_conflict(Self::on_conflict(policy))
                .exec_without_returning(conn)
                .await?;
        }
        Ok(written)
    }
}

#[async_trait]
impl BlockStore for MirrorDb {
    type Unit = DbUnit;

    #[instrument(skip(self))]
    async fn max_height(&self) -> MirrorResult<Option<u64>> {
        let row = self
            .0
            .query_one(Statement::from_string(DbBackend::Postgres, MAX_HEIGHT_SQL))
            .await?;
        let height = match row {
            Some(row) => Some(row.try_get::<i64>("", "height")? as u64),
            None => None,
        };
        trace!(?height, "Queried local max height");
        Ok(height)
    }

    #[instrument(skip_all, fields(blocks = blocks.len(), ?policy))]
    async fn write_blocks(&self, blocks: &[Block], policy: ConflictPolicy) -> MirrorResult<u64> {
        if blocks.is_empty() {
            return Ok(0);
        }
        let written = if blocks.len() > Self::STORE_BLOCK_CHUNK_SIZE {
            // more than one statement, keep them atomic
            let txn = self.0.begin().await?;
            let written = Self::upsert_blocks(&txn, blocks, policy).await?;
            txn.commit().await?;
            written
        } else {
            Self::upsert_blocks(&*self.0, blocks, policy).await?
        };
        debug!(written, "Wrote blocks to database");
        Ok(written)
    }

    async fn begin_unit(&self) -> MirrorResult<DbUnit> {
        Ok(DbUnit {
            txn: self.0.begin().await?,
            written: 0,
        })
    }

    #[instrument(skip(self))]
    async fn delete_from(&self, height: u64) -> MirrorResult<Vec<u64>> {
        let rows = self
            .0
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                DELETE_FROM_SQL,
                [(height as i64).into()],
            ))
            .await?;
        let mut heights = rows
            .iter()
            .map(|row| row.try_get::<i64>("", "height").map(|h| h as u64))
            .collect::<Result<Vec<_>, _>>()?;
        heights.sort_unstable();
        debug!(deleted = heights.len(), "Deleted blocks from database");
        Ok(heights)
    }
}

/// One database transaction spanning several batch writes.
#[derive(Debug)]
pub struct DbUnit {
    txn: DatabaseTransaction,
    written: u64,
}

#[async_trait]
impl StoreUnit for DbUnit {
    async fn write_blocks(
        &mut self,
        blocks: &[Block],
        policy: ConflictPolicy,
    ) -> MirrorResult<u64> {
        if blocks.is_empty() {
            return Ok(0);
        }
        let written = MirrorDb::upsert_blocks(&self.txn, blocks, policy).await?;
        self.written += written;
        Ok(written)
    }

    #[instrument(skip_all, fields(written = self.written))]
    async fn commit(self) -> MirrorResult<()> {
        self.txn.commit().await?;
        debug!("Committed unit of work");
        Ok(())
    }
}
