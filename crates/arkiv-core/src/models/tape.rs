//! Tape library hardware: robots, drives and slots.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default drive idle time before an automatic unmount is requested.
pub const DEFAULT_IDLE_TIME_SECS: i64 = 3600;

/// Operational status shared by drives and slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum DeviceStatus {
    Inactive = 0,
    Write = 20,
    Fail = 100,
}

impl DeviceStatus {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(DeviceStatus::Inactive),
            20 => Some(DeviceStatus::Write),
            100 => Some(DeviceStatus::Fail),
            _ => None,
        }
    }
}

impl From<DeviceStatus> for i32 {
    fn from(status: DeviceStatus) -> i32 {
        status as i32
    }
}

impl TryFrom<i32> for DeviceStatus {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        DeviceStatus::from_i32(value)
            .ok_or_else(|| anyhow::anyhow!("invalid device status: {}", value))
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceStatus::Inactive => "Inactive",
            DeviceStatus::Write => "Write",
            DeviceStatus::Fail => "FAIL",
        };
        write!(f, "{}", label)
    }
}

/// A tape library changer. Mount and unmount jobs hold the robot exclusively
/// while the arm moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Robot {
    pub id: Uuid,
    pub label: String,
    /// Changer device node, e.g. `/dev/sg4`.
    pub device: String,
    pub online: bool,
}

/// A tape drive inside a robot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapeDrive {
    pub id: Uuid,
    /// Drive number within the robot, used for `mtx` transfers.
    pub drive_id: i32,
    /// Drive device node, e.g. `/dev/nst0`.
    pub device: String,
    pub robot_id: Option<Uuid>,
    pub status: DeviceStatus,
    /// I/O queue entry currently holding the drive, if any.
    pub io_queue_entry_id: Option<Uuid>,
    pub num_of_mounts: i32,
    pub idle_time_secs: i64,
    pub locked: bool,
    pub last_change: DateTime<Utc>,
}

impl TapeDrive {
    /// The drive has sat unused long enough to give its tape back to the
    /// library.
    pub fn is_idle(&self, now: DateTime<Utc>) -> bool {
        now >= self.last_change + Duration::seconds(self.idle_time_secs)
    }

    pub fn is_locked_by_other(&self, entry_id: Uuid) -> bool {
        self.io_queue_entry_id.is_some_and(|owner| owner != entry_id)
    }
}

/// A storage slot inside a robot. `medium_id` is the barcode reported by the
/// library inventory, present whether or not a medium record exists yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapeSlot {
    pub id: Uuid,
    pub slot_id: i32,
    pub medium_id: Option<String>,
    pub robot_id: Option<Uuid>,
    pub status: DeviceStatus,
}
