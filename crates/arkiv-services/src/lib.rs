//! Arkiv Storage Services
//!
//! The orchestration layer on top of the store, drivers, jobs and remote
//! client: topology resolution, the migration planner, the tape robot
//! scheduler with its idle-drive sweep, medium sealing with read-back
//! verification, container packaging and the placement read/write path.
//! Every service holds the store behind its trait, so production runs
//! against PostgreSQL and tests against the in-memory store.

pub mod packaging;
pub mod planner;
pub mod readwrite;
pub mod scheduler;
pub mod sealing;
pub mod topology;

// Re-export commonly used types
pub use packaging::{build_container, extract_container};
pub use planner::{deactivatable_media, plan_policy, MigrationNeed, MigrationPlanner};
pub use readwrite::ReadWritePath;
pub use scheduler::{PollReport, TapeRobotScheduler};
pub use sealing::{verification_sample, MediumSealer};
pub use topology::Topology;
