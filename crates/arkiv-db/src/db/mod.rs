//! Database access layer
//!
//! The [`store::StorageStore`] trait abstracts every query the services
//! need; [`pg::PgStore`] is the PostgreSQL implementation. Row types live in
//! `rows` and convert into the domain models from `arkiv-core`.
//
// Store trait shared by PostgreSQL and the in-memory test store
pub mod store;
//
// PostgreSQL implementation
pub mod pg;
//
// FromRow types and their domain conversions
pub mod rows;
//
// Transaction utilities
pub mod transaction;

pub use pg::{create_pool, PgStore};
pub use store::{PullBatch, StorageStore};
