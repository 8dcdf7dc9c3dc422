//! Storage media: individual tapes and disk volumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::tape::{DeviceStatus, TapeSlot};
use crate::models::target::StorageTarget;

/// Lifecycle status of a medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum MediumStatus {
    Inactive = 0,
    Write = 20,
    Full = 30,
    Fail = 100,
}

impl MediumStatus {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(MediumStatus::Inactive),
            20 => Some(MediumStatus::Write),
            30 => Some(MediumStatus::Full),
            100 => Some(MediumStatus::Fail),
            _ => None,
        }
    }

    /// Media that hold readable content. Sealed media stay readable.
    pub fn is_active(&self) -> bool {
        *self != MediumStatus::Inactive
    }

    pub fn is_writeable(&self) -> bool {
        *self == MediumStatus::Write
    }
}

impl From<MediumStatus> for i32 {
    fn from(status: MediumStatus) -> i32 {
        status as i32
    }
}

impl TryFrom<i32> for MediumStatus {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        MediumStatus::from_i32(value)
            .ok_or_else(|| anyhow::anyhow!("invalid medium status: {}", value))
    }
}

impl std::fmt::Display for MediumStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MediumStatus::Inactive => "Inactive",
            MediumStatus::Write => "Write",
            MediumStatus::Full => "Full",
            MediumStatus::Fail => "FAIL",
        };
        write!(f, "{}", label)
    }
}

/// Physical whereabouts of a medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum LocationStatus {
    Delivered = 10,
    Received = 20,
    Placed = 30,
    Collected = 40,
    Robot = 50,
}

impl LocationStatus {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            10 => Some(LocationStatus::Delivered),
            20 => Some(LocationStatus::Received),
            30 => Some(LocationStatus::Placed),
            40 => Some(LocationStatus::Collected),
            50 => Some(LocationStatus::Robot),
            _ => None,
        }
    }
}

impl From<LocationStatus> for i32 {
    fn from(status: LocationStatus) -> i32 {
        status as i32
    }
}

impl TryFrom<i32> for LocationStatus {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        LocationStatus::from_i32(value)
            .ok_or_else(|| anyhow::anyhow!("invalid location status: {}", value))
    }
}

impl std::fmt::Display for LocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LocationStatus::Delivered => "Delivered",
            LocationStatus::Received => "Received",
            LocationStatus::Placed => "Placed",
            LocationStatus::Collected => "Collected",
            LocationStatus::Robot => "Robot",
        };
        write!(f, "{}", label)
    }
}

/// A single tape or disk volume belonging to a [`StorageTarget`].
///
/// `medium_id` carries the barcode for tapes and a `DISK_<target>` label for
/// disks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageMedium {
    pub id: Uuid,
    pub medium_id: String,
    pub storage_target_id: Uuid,
    pub status: MediumStatus,
    pub location: String,
    pub location_status: LocationStatus,
    /// In 512-byte units.
    pub block_size: i32,
    pub format: i32,
    pub used_capacity: i64,
    pub num_of_mounts: i32,
    pub create_date: DateTime<Utc>,
    /// Identifier of the site that created the medium.
    pub agent: String,
    pub tape_slot_id: Option<Uuid>,
    pub tape_drive_id: Option<Uuid>,
    /// Bumped on every local save.
    pub last_changed_local: Option<DateTime<Utc>>,
    /// Timestamp of the copy held by the master site.
    pub last_changed_external: Option<DateTime<Utc>>,
}

impl StorageMedium {
    /// Allocates a new tape medium out of `slot`, inheriting block size and
    /// format from the target.
    pub fn new_on_tape(target: &StorageTarget, slot: &TapeSlot, agent: &str, location: &str) -> Self {
        let now = Utc::now();
        StorageMedium {
            id: Uuid::new_v4(),
            medium_id: slot.medium_id.clone().unwrap_or_default(),
            storage_target_id: target.id,
            status: MediumStatus::Write,
            location: location.to_string(),
            location_status: LocationStatus::Robot,
            block_size: target.default_block_size,
            format: target.default_format,
            used_capacity: 0,
            num_of_mounts: 0,
            create_date: now,
            agent: agent.to_string(),
            tape_slot_id: Some(slot.id),
            tape_drive_id: None,
            last_changed_local: Some(now),
            last_changed_external: None,
        }
    }

    pub fn new_on_disk(target: &StorageTarget, agent: &str, location: &str) -> Self {
        let now = Utc::now();
        StorageMedium {
            id: Uuid::new_v4(),
            medium_id: format!("DISK_{}", target.name),
            storage_target_id: target.id,
            status: MediumStatus::Write,
            location: location.to_string(),
            location_status: LocationStatus::Robot,
            block_size: target.default_block_size,
            format: target.default_format,
            used_capacity: 0,
            num_of_mounts: 0,
            create_date: now,
            agent: agent.to_string(),
            tape_slot_id: None,
            tape_drive_id: None,
            last_changed_local: Some(now),
            last_changed_external: None,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.tape_drive_id.is_some()
    }

    /// True when the master site holds the same version as we do.
    pub fn check_db_sync(&self) -> bool {
        match (self.last_changed_local, self.last_changed_external) {
            (Some(local), Some(external)) => local == external,
            _ => false,
        }
    }

    pub fn should_be_sealed(&self, target: &StorageTarget) -> bool {
        target.max_capacity > 0 && self.used_capacity >= target.max_capacity
    }

    pub fn touch(&mut self) {
        self.last_changed_local = Some(Utc::now());
    }
}

/// Picks the lowest-numbered slot holding an unallocated tape whose barcode
/// starts with `barcode_prefix`.
pub fn free_tape_slot<'a>(
    slots: &'a [TapeSlot],
    media: &[StorageMedium],
    barcode_prefix: &str,
) -> Option<&'a TapeSlot> {
    slots
        .iter()
        .filter(|slot| {
            slot.status == DeviceStatus::Write
                && slot
                    .medium_id
                    .as_deref()
                    .is_some_and(|barcode| !barcode.is_empty() && barcode.starts_with(barcode_prefix))
                && !media.iter().any(|medium| medium.tape_slot_id == Some(slot.id))
        })
        .min_by_key(|slot| slot.slot_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> StorageTarget {
        StorageTarget {
            id: Uuid::new_v4(),
            name: "lto5-pool".into(),
            status: true,
            medium_type: 305,
            default_block_size: 512,
            default_format: 103,
            min_capacity_warning: 0,
            max_capacity: 100,
            remote_server: None,
            master_server: None,
            target: "ST".into(),
        }
    }

    fn slot(slot_id: i32, barcode: &str) -> TapeSlot {
        TapeSlot {
            id: Uuid::new_v4(),
            slot_id,
            medium_id: Some(barcode.to_string()),
            robot_id: Some(Uuid::new_v4()),
            status: DeviceStatus::Write,
        }
    }

    #[test]
    fn allocates_lowest_matching_slot() {
        let slots = vec![slot(7, "ST0007"), slot(3, "ST0003"), slot(1, "XX0001")];
        let found = free_tape_slot(&slots, &[], "ST").unwrap();
        assert_eq!(found.slot_id, 3);
    }

    #[test]
    fn skips_slots_with_allocated_media() {
        let target = target();
        let slots = vec![slot(3, "ST0003"), slot(7, "ST0007")];
        let medium = StorageMedium::new_on_tape(&target, &slots[0], "site-a", "Media");
        let found = free_tape_slot(&slots, std::slice::from_ref(&medium), "ST").unwrap();
        assert_eq!(found.slot_id, 7);
    }

    #[test]
    fn skips_empty_and_failed_slots() {
        let mut empty = slot(1, "ST0001");
        empty.medium_id = None;
        let mut failed = slot(2, "ST0002");
        failed.status = DeviceStatus::Fail;
        assert!(free_tape_slot(&[empty, failed], &[], "ST").is_none());
    }

    #[test]
    fn new_tape_medium_takes_barcode_and_slot() {
        let target = target();
        let slot = slot(3, "ST0003");
        let medium = StorageMedium::new_on_tape(&target, &slot, "site-a", "Media");
        assert_eq!(medium.medium_id, "ST0003");
        assert_eq!(medium.tape_slot_id, Some(slot.id));
        assert_eq!(medium.block_size, 512);
        assert!(medium.status.is_writeable());
        assert!(!medium.is_mounted());
    }

    #[test]
    fn disk_medium_is_named_after_target() {
        let target = target();
        let medium = StorageMedium::new_on_disk(&target, "site-a", "Media");
        assert_eq!(medium.medium_id, "DISK_lto5-pool");
        assert_eq!(medium.tape_slot_id, None);
    }

    #[test]
    fn sealing_threshold_respects_zero_capacity() {
        let mut target = target();
        let mut medium = StorageMedium::new_on_disk(&target, "site-a", "Media");
        medium.used_capacity = 100;
        assert!(medium.should_be_sealed(&target));
        medium.used_capacity = 99;
        assert!(!medium.should_be_sealed(&target));
        target.max_capacity = 0;
        medium.used_capacity = i64::MAX;
        assert!(!medium.should_be_sealed(&target));
    }

    #[test]
    fn db_sync_needs_both_timestamps_equal() {
        let target = target();
        let mut medium = StorageMedium::new_on_disk(&target, "site-a", "Media");
        assert!(!medium.check_db_sync());
        medium.last_changed_external = medium.last_changed_local;
        assert!(medium.check_db_sync());
        medium.touch();
        assert!(!medium.check_db_sync());
    }
}
