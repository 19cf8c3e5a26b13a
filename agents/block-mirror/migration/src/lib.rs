#![deny(dead_code)]

pub use sea_orm_migration::prelude::*;

mod m20190917_000001_create_table_blocks_raw;

pub use m20190917_000001_create_table_blocks_raw::BlocksRaw;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20190917_000001_create_table_blocks_raw::Migration)]
    }
}
