//! Domain models
//!
//! Topology (policies, methods, targets and their relations), physical media
//! and placements, tape hardware, request queues and the snapshot type the
//! eligibility predicates are evaluated over.

pub mod medium;
pub mod method;
pub mod object;
pub mod package;
pub mod queue;
pub mod snapshot;
pub mod tape;
pub mod target;

pub use medium::{free_tape_slot, LocationStatus, MediumStatus, StorageMedium};
pub use method::{MediumClass, MethodTargetRelation, RelationStatus, StorageMethod, StoragePolicy};
pub use object::{fastest_key, StorageObject};
pub use package::{ContainerFormat, InformationPackage};
pub use queue::{IoQueueEntry, IoReqType, QueueStatus, RemoteStatus, RobotQueueEntry, RobotReqType};
pub use snapshot::TopologySnapshot;
pub use tape::{DeviceStatus, Robot, TapeDrive, TapeSlot};
pub use target::{RemoteCredentials, StorageTarget};
