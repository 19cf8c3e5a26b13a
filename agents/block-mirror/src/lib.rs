//! Mirrors the blocks of a remote chain node into a Postgres table, keeping
//! up with the tip and repairing short reorgs.

#![forbid(unsafe_code)]

pub mod catch_up;
pub mod db;
pub mod decoder;
pub mod error;
pub mod fetcher;
pub mod height;
pub mod metrics;
pub mod mirror;
pub mod node;
pub mod reorg;
pub mod scheduler;
pub mod server;
pub mod settings;
pub mod store;
pub mod types;
pub mod update;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_utils;
