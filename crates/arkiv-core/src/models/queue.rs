//! Queue entries for I/O work and robot arm movements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MediumClass;

/// Processing status shared by I/O and robot queue entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum QueueStatus {
    Inactive = -1,
    Pending = 0,
    Initiate = 2,
    Progress = 5,
    Success = 20,
    Fail = 100,
}

impl QueueStatus {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            -1 => Some(QueueStatus::Inactive),
            0 => Some(QueueStatus::Pending),
            2 => Some(QueueStatus::Initiate),
            5 => Some(QueueStatus::Progress),
            20 => Some(QueueStatus::Success),
            100 => Some(QueueStatus::Fail),
            _ => None,
        }
    }

    /// Entries a poll run picks up. Initiated entries sort before pending
    /// ones so retried contention work is not starved.
    pub fn awaiting_processing(&self) -> bool {
        matches!(self, QueueStatus::Pending | QueueStatus::Initiate)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Success | QueueStatus::Fail)
    }
}

impl From<QueueStatus> for i32 {
    fn from(status: QueueStatus) -> i32 {
        status as i32
    }
}

impl TryFrom<i32> for QueueStatus {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        QueueStatus::from_i32(value)
            .ok_or_else(|| anyhow::anyhow!("invalid queue status: {}", value))
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            QueueStatus::Inactive => "Inactive",
            QueueStatus::Pending => "Pending",
            QueueStatus::Initiate => "Initiate",
            QueueStatus::Progress => "Progress",
            QueueStatus::Success => "Success",
            QueueStatus::Fail => "FAIL",
        };
        write!(f, "{}", label)
    }
}

/// Status of the shipment leg of an I/O entry served on behalf of a master
/// site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum RemoteStatus {
    Pending = 0,
    Initiate = 2,
    Transfer = 5,
    Success = 20,
    Fail = 100,
}

impl RemoteStatus {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(RemoteStatus::Pending),
            2 => Some(RemoteStatus::Initiate),
            5 => Some(RemoteStatus::Transfer),
            20 => Some(RemoteStatus::Success),
            100 => Some(RemoteStatus::Fail),
            _ => None,
        }
    }
}

impl From<RemoteStatus> for i32 {
    fn from(status: RemoteStatus) -> i32 {
        status as i32
    }
}

impl TryFrom<i32> for RemoteStatus {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        RemoteStatus::from_i32(value)
            .ok_or_else(|| anyhow::anyhow!("invalid remote status: {}", value))
    }
}

impl std::fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RemoteStatus::Pending => "Pending",
            RemoteStatus::Initiate => "Initiate",
            RemoteStatus::Transfer => "Transfer",
            RemoteStatus::Success => "Success",
            RemoteStatus::Fail => "FAIL",
        };
        write!(f, "{}", label)
    }
}

/// Kind of movement requested from a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum RobotReqType {
    Mount = 10,
    Unmount = 20,
    /// Unmount even when the drive is locked by an I/O entry.
    ForcedUnmount = 30,
}

impl RobotReqType {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            10 => Some(RobotReqType::Mount),
            20 => Some(RobotReqType::Unmount),
            30 => Some(RobotReqType::ForcedUnmount),
            _ => None,
        }
    }
}

impl From<RobotReqType> for i32 {
    fn from(req: RobotReqType) -> i32 {
        req as i32
    }
}

impl TryFrom<i32> for RobotReqType {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        RobotReqType::from_i32(value)
            .ok_or_else(|| anyhow::anyhow!("invalid robot request type: {}", value))
    }
}

impl std::fmt::Display for RobotReqType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RobotReqType::Mount => "mount",
            RobotReqType::Unmount => "unmount",
            RobotReqType::ForcedUnmount => "unmount (forced)",
        };
        write!(f, "{}", label)
    }
}

/// Kind of transfer requested from the I/O queue. The code carries both the
/// direction and the medium class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum IoReqType {
    WriteToTape = 10,
    WriteToDisk = 15,
    ReadFromTape = 20,
    ReadFromDisk = 25,
    WriteToCas = 41,
    ReadFromCas = 42,
}

impl IoReqType {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            10 => Some(IoReqType::WriteToTape),
            15 => Some(IoReqType::WriteToDisk),
            20 => Some(IoReqType::ReadFromTape),
            25 => Some(IoReqType::ReadFromDisk),
            41 => Some(IoReqType::WriteToCas),
            42 => Some(IoReqType::ReadFromCas),
            _ => None,
        }
    }

    pub fn write_for(class: MediumClass) -> IoReqType {
        match class {
            MediumClass::Tape => IoReqType::WriteToTape,
            MediumClass::Disk => IoReqType::WriteToDisk,
            MediumClass::Cas => IoReqType::WriteToCas,
        }
    }

    pub fn read_for(class: MediumClass) -> IoReqType {
        match class {
            MediumClass::Tape => IoReqType::ReadFromTape,
            MediumClass::Disk => IoReqType::ReadFromDisk,
            MediumClass::Cas => IoReqType::ReadFromCas,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            IoReqType::WriteToTape | IoReqType::WriteToDisk | IoReqType::WriteToCas
        )
    }

    pub fn medium_class(&self) -> MediumClass {
        match self {
            IoReqType::WriteToTape | IoReqType::ReadFromTape => MediumClass::Tape,
            IoReqType::WriteToDisk | IoReqType::ReadFromDisk => MediumClass::Disk,
            IoReqType::WriteToCas | IoReqType::ReadFromCas => MediumClass::Cas,
        }
    }
}

impl From<IoReqType> for i32 {
    fn from(req: IoReqType) -> i32 {
        req as i32
    }
}

impl TryFrom<i32> for IoReqType {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        IoReqType::from_i32(value)
            .ok_or_else(|| anyhow::anyhow!("invalid io request type: {}", value))
    }
}

/// A queued robot arm movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotQueueEntry {
    pub id: Uuid,
    pub req_type: RobotReqType,
    pub status: QueueStatus,
    pub posted: DateTime<Utc>,
    pub storage_medium_id: Uuid,
    /// Requested drive. Mounts without one take any free drive.
    pub tape_drive_id: Option<Uuid>,
    /// Robot executing the entry, held only while the arm moves.
    pub robot_id: Option<Uuid>,
    /// I/O entry the mount is performed for. Grants the drive lock.
    pub io_queue_entry_id: Option<Uuid>,
}

impl RobotQueueEntry {
    pub fn mount(
        storage_medium_id: Uuid,
        tape_drive_id: Option<Uuid>,
        io_queue_entry_id: Option<Uuid>,
    ) -> Self {
        RobotQueueEntry {
            id: Uuid::new_v4(),
            req_type: RobotReqType::Mount,
            status: QueueStatus::Pending,
            posted: Utc::now(),
            storage_medium_id,
            tape_drive_id,
            robot_id: None,
            io_queue_entry_id,
        }
    }

    pub fn unmount(storage_medium_id: Uuid, force: bool) -> Self {
        RobotQueueEntry {
            id: Uuid::new_v4(),
            req_type: if force {
                RobotReqType::ForcedUnmount
            } else {
                RobotReqType::Unmount
            },
            status: QueueStatus::Pending,
            posted: Utc::now(),
            storage_medium_id,
            tape_drive_id: None,
            robot_id: None,
            io_queue_entry_id: None,
        }
    }
}

/// A queued read or write of one package against one storage method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoQueueEntry {
    pub id: Uuid,
    pub req_type: IoReqType,
    pub req_purpose: Option<String>,
    /// Source path for writes, destination path for reads.
    pub object_path: Option<String>,
    pub write_size: Option<i64>,
    pub result: Option<serde_json::Value>,
    pub status: QueueStatus,
    pub posted: DateTime<Utc>,
    pub ip_id: Option<Uuid>,
    pub method_target_id: Option<Uuid>,
    pub storage_medium_id: Option<Uuid>,
    pub storage_object_id: Option<Uuid>,
    pub remote_status: RemoteStatus,
    pub transfer_task_id: Option<String>,
}

impl IoQueueEntry {
    pub fn new(req_type: IoReqType, ip_id: Uuid, method_target_id: Uuid) -> Self {
        IoQueueEntry {
            id: Uuid::new_v4(),
            req_type,
            req_purpose: None,
            object_path: None,
            write_size: None,
            result: None,
            status: QueueStatus::Pending,
            posted: Utc::now(),
            ip_id: Some(ip_id),
            method_target_id: Some(method_target_id),
            storage_medium_id: None,
            storage_object_id: None,
            remote_status: RemoteStatus::Pending,
            transfer_task_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_type_codes_round_trip_by_class() {
        for class in [MediumClass::Disk, MediumClass::Tape, MediumClass::Cas] {
            let write = IoReqType::write_for(class);
            let read = IoReqType::read_for(class);
            assert!(write.is_write());
            assert!(!read.is_write());
            assert_eq!(write.medium_class(), class);
            assert_eq!(read.medium_class(), class);
        }
        assert_eq!(IoReqType::write_for(MediumClass::Tape).as_i32(), 10);
        assert_eq!(IoReqType::read_for(MediumClass::Disk).as_i32(), 25);
    }

    #[test]
    fn queue_status_processing_window() {
        assert!(QueueStatus::Pending.awaiting_processing());
        assert!(QueueStatus::Initiate.awaiting_processing());
        assert!(!QueueStatus::Progress.awaiting_processing());
        assert!(!QueueStatus::Fail.awaiting_processing());
        assert!(QueueStatus::Fail.is_terminal());
        assert!(!QueueStatus::Inactive.is_terminal());
    }

    #[test]
    fn forced_unmount_request() {
        let medium = Uuid::new_v4();
        let entry = RobotQueueEntry::unmount(medium, true);
        assert_eq!(entry.req_type, RobotReqType::ForcedUnmount);
        assert_eq!(entry.status, QueueStatus::Pending);
        assert_eq!(entry.storage_medium_id, medium);
        assert!(entry.robot_id.is_none());
    }

    #[test]
    fn mount_request_carries_io_owner() {
        let medium = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let entry = RobotQueueEntry::mount(medium, None, Some(owner));
        assert_eq!(entry.req_type, RobotReqType::Mount);
        assert_eq!(entry.io_queue_entry_id, Some(owner));
        assert!(entry.tape_drive_id.is_none());
    }
}
