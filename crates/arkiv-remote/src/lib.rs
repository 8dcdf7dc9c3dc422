//! Arkiv Remote Site Layer
//!
//! HTTP client for other preservation sites and the replication sync that
//! keeps topology state aligned between a master site and its remotes.
//! Network failures are classified into transient (timeouts, 5xx) and
//! permanent (4xx) so that only the former are retried, with the fixed
//! bounded policy from [`retry::RetryPolicy`].

pub mod client;
pub mod retry;
pub mod sync;

pub use client::{RemoteJob, RemoteJobStatus, SiteClient};
pub use retry::RetryPolicy;
pub use sync::ReplicationSync;
