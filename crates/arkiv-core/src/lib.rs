//! Arkiv Core Library
//!
//! This crate provides the domain model, error types and configuration shared
//! across all arkiv components: storage methods and targets, physical media,
//! placements, tape hardware and the request queues, together with the pure
//! eligibility predicates (fastest ordering, migration and deactivation rules)
//! evaluated over a topology snapshot.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod validate;

// Re-export commonly used types
pub use config::StorageConfig;
pub use error::{ErrorKind, Result, StorageError};
pub use models::{
    ContainerFormat, DeviceStatus, InformationPackage, IoQueueEntry, IoReqType, LocationStatus,
    MediumClass, MediumStatus, MethodTargetRelation, QueueStatus, RelationStatus, RemoteCredentials,
    RemoteStatus, Robot, RobotQueueEntry, RobotReqType, StorageMedium, StorageMethod, StorageObject,
    StoragePolicy, StorageTarget, TapeDrive, TapeSlot, TopologySnapshot,
};
pub use validate::{verify_digest, Validator, ValidatorOptions};
