//! Arkiv Job Executor Seam
//!
//! The storage core never touches hardware or runs migrations itself; it
//! describes the work as named jobs and hands them to an external execution
//! engine through the [`JobExecutor`] trait. Submission is idempotent by
//! (job name, package, pending status) so pollers can re-plan freely while
//! earlier jobs are still queued.

pub mod executor;
pub mod model;

pub use executor::{JobExecutor, NoopExecutor};
pub use model::{
    JobName, JobRequest, MigrateStorageParams, MountTapeParams, UnmountTapeParams,
};
