//! Arkiv Database Layer
//!
//! Persistence for the storage topology, queues and hardware inventory.
//! All access goes through the [`StorageStore`] trait so services can run
//! against PostgreSQL in production and an in-memory store in tests.

pub mod db;

pub use db::pg::{create_pool, PgStore};
pub use db::store::{PullBatch, StorageStore};
pub use db::transaction::TransactionGuard;
