//! Arkiv Test Kit
//!
//! Shared test doubles: an in-memory [`StorageStore`](arkiv_db::StorageStore)
//! that mirrors the PostgreSQL store's query semantics, a recording job
//! executor, a SHA-256 validator and builders for topology fixtures.
//!
//! This crate is only ever a dev-dependency.

pub mod executor;
pub mod fixtures;
pub mod store;
pub mod validator;

pub use executor::RecordingExecutor;
pub use store::MemoryStore;
pub use validator::ChecksumValidator;
