//! Arkiv Storage Library
//!
//! Placement drivers for the three medium classes: disk volumes, tapes
//! behind a library robot, and content-addressable stores. Drivers move
//! bytes between prepared package files and media; all queue, lock and
//! inventory bookkeeping stays with the calling service.
//!
//! Tape access shells out to `mtx` (robot arm) and `mt` (drive positioning)
//! and streams tar archives against the drive device with the medium's
//! fixed block size.

pub mod cas;
pub mod disk;
pub mod tape;
pub mod traits;

// Re-export commonly used types
pub use cas::CasDriver;
pub use disk::DiskDriver;
pub use tape::TapeDriver;
pub use traits::{DriverError, DriverResult, PlacementDriver, ReadRequest, WriteRequest};
