use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BlocksRaw::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BlocksRaw::Height)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BlocksRaw::B).json_binary().not_null())
                    .to_owned(),
            )
            .await?;

        // operators look blocks up by signature
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS blocks_raw_signature_idx ON blocks_raw ((b->>'signature'))",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BlocksRaw::Table).to_owned())
            .await
    }
}

/// Learn more at https://docs.rs/sea-query#iden
#[derive(Iden)]
pub enum BlocksRaw {
    Table,
    /// Block height, the natural key of a mirrored block
    Height,
    /// Verbatim block document as returned by the node
    B,
}
