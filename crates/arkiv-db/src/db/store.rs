//! Store trait shared by the PostgreSQL store and the in-memory test store.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use arkiv_core::models::{
    InformationPackage, IoQueueEntry, MethodTargetRelation, RelationStatus, Robot,
    RobotQueueEntry, StorageMedium, StorageMethod, StorageObject, StorageTarget, TapeDrive,
    TapeSlot, TopologySnapshot,
};
use arkiv_core::Result;

/// Entities gathered by one recursive replication pull. References come
/// before their referents so the batch can be applied in order.
#[derive(Debug, Default)]
pub struct PullBatch {
    pub robots: Vec<Robot>,
    pub tape_slots: Vec<TapeSlot>,
    pub tape_drives: Vec<TapeDrive>,
    pub media: Vec<StorageMedium>,
    pub objects: Vec<StorageObject>,
}

/// Trait for storage store operations
/// This abstracts the database implementation (PostgreSQL)
#[async_trait::async_trait]
pub trait StorageStore: Send + Sync {
    // --- topology ---

    /// Load the whole topology in one consistent view.
    async fn snapshot(&self) -> Result<TopologySnapshot>;

    async fn storage_method(&self, id: Uuid) -> Result<Option<StorageMethod>>;

    async fn storage_target(&self, id: Uuid) -> Result<Option<StorageTarget>>;

    /// The relation a method currently writes through, if any.
    async fn enabled_relation(&self, method_id: Uuid) -> Result<Option<MethodTargetRelation>>;

    /// Change a relation's status. Fails when enabling a relation while the
    /// method already has another enabled one.
    async fn set_relation_status(&self, relation_id: Uuid, status: RelationStatus) -> Result<()>;

    // --- packages and placements ---

    async fn information_package(&self, id: Uuid) -> Result<Option<InformationPackage>>;

    async fn storage_object(&self, id: Uuid) -> Result<Option<StorageObject>>;

    /// Placements on a medium, ordered by tape position.
    async fn objects_on_medium(&self, medium_id: Uuid) -> Result<Vec<StorageObject>>;

    async fn insert_storage_object(&self, object: &StorageObject) -> Result<()>;

    // --- media ---

    async fn storage_medium(&self, id: Uuid) -> Result<Option<StorageMedium>>;

    async fn storage_medium_by_barcode(&self, barcode: &str) -> Result<Option<StorageMedium>>;

    /// The medium a target currently writes to, allocating a new one when
    /// none is open. Tape allocation takes the lowest free slot whose
    /// barcode matches the target's prefix.
    async fn get_or_create_write_medium(
        &self,
        target: &StorageTarget,
        location: &str,
        agent: &str,
    ) -> Result<StorageMedium>;

    async fn update_storage_medium(&self, medium: &StorageMedium) -> Result<()>;

    async fn mounted_medium_of_drive(&self, drive_id: Uuid) -> Result<Option<StorageMedium>>;

    // --- tape hardware ---

    async fn robot(&self, id: Uuid) -> Result<Option<Robot>>;

    async fn tape_drive(&self, id: Uuid) -> Result<Option<TapeDrive>>;

    async fn tape_slot(&self, id: Uuid) -> Result<Option<TapeSlot>>;

    async fn update_tape_drive(&self, drive: &TapeDrive) -> Result<()>;

    /// Least-used free drive: working, empty, unlocked and not held by any
    /// I/O entry.
    async fn free_tape_drive(&self) -> Result<Option<TapeDrive>>;

    /// A robot not currently executing any queue entry.
    async fn free_robot(&self) -> Result<Option<Robot>>;

    /// Unlocked drives whose tape has sat idle past the drive's idle time.
    async fn idle_mounted_drives(&self, now: DateTime<Utc>) -> Result<Vec<TapeDrive>>;

    /// Record a finished mount: bind the medium to the drive and bump the
    /// mount counters on both.
    async fn complete_mount(&self, medium_id: Uuid, drive_id: Uuid) -> Result<()>;

    /// Record a finished unmount: unbind the medium and release the drive
    /// lock.
    async fn complete_unmount(&self, medium_id: Uuid) -> Result<()>;

    // --- robot queue ---

    async fn insert_robot_queue_entry(&self, entry: &RobotQueueEntry) -> Result<()>;

    async fn update_robot_queue_entry(&self, entry: &RobotQueueEntry) -> Result<()>;

    async fn delete_robot_queue_entry(&self, id: Uuid) -> Result<()>;

    /// Forced unmounts awaiting processing, most recently initiated first.
    async fn pending_forced_unmounts(&self) -> Result<Vec<RobotQueueEntry>>;

    /// Regular entries awaiting processing: initiated before pending,
    /// unmounts before mounts, oldest first within a group.
    async fn pending_robot_entries(&self, limit: i64) -> Result<Vec<RobotQueueEntry>>;

    /// Whether an unmount of the medium is already queued.
    async fn has_pending_unmount(&self, medium_id: Uuid) -> Result<bool>;

    // --- io queue ---

    async fn io_queue_entry(&self, id: Uuid) -> Result<Option<IoQueueEntry>>;

    async fn insert_io_queue_entry(&self, entry: &IoQueueEntry) -> Result<()>;

    async fn update_io_queue_entry(&self, entry: &IoQueueEntry) -> Result<()>;

    // --- entity sync ---

    /// Upsert every entity gathered by one replication pull as a single
    /// all-or-nothing write.
    async fn apply_pull(&self, batch: &PullBatch) -> Result<()>;
}
