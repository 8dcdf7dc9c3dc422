//! Row types for FromRow and their conversions into domain models.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use arkiv_core::models::{
    ContainerFormat, DeviceStatus, InformationPackage, IoQueueEntry, IoReqType, LocationStatus,
    MediumClass, MediumStatus, MethodTargetRelation, QueueStatus, RelationStatus, RemoteStatus,
    Robot, RobotQueueEntry, RobotReqType, StorageMedium, StorageMethod, StorageObject,
    StoragePolicy, StorageTarget, TapeDrive, TapeSlot,
};
use arkiv_core::{Result, StorageError};

#[derive(Debug, sqlx::FromRow)]
pub struct PolicyRow {
    pub id: Uuid,
    pub name: String,
    pub storage_methods: Vec<Uuid>,
}

impl PolicyRow {
    pub fn to_policy(self) -> StoragePolicy {
        StoragePolicy {
            id: self.id,
            name: self.name,
            storage_methods: self.storage_methods,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct MethodRow {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub class: MediumClass,
    pub remote: bool,
    pub containers: bool,
    pub cached: bool,
}

impl MethodRow {
    pub fn to_method(self) -> StorageMethod {
        StorageMethod {
            id: self.id,
            name: self.name,
            enabled: self.enabled,
            class: self.class,
            remote: self.remote,
            containers: self.containers,
            cached: self.cached,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct TargetRow {
    pub id: Uuid,
    pub name: String,
    pub status: bool,
    pub medium_type: i32,
    pub default_block_size: i32,
    pub default_format: i32,
    pub min_capacity_warning: i64,
    pub max_capacity: i64,
    pub remote_server: Option<String>,
    pub master_server: Option<String>,
    pub target: String,
}

impl TargetRow {
    pub fn to_target(self) -> StorageTarget {
        StorageTarget {
            id: self.id,
            name: self.name,
            status: self.status,
            medium_type: self.medium_type,
            default_block_size: self.default_block_size,
            default_format: self.default_format,
            min_capacity_warning: self.min_capacity_warning,
            max_capacity: self.max_capacity,
            remote_server: self.remote_server,
            master_server: self.master_server,
            target: self.target,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct RelationRow {
    pub id: Uuid,
    pub name: String,
    pub status: RelationStatus,
    pub storage_method_id: Uuid,
    pub storage_target_id: Uuid,
}

impl RelationRow {
    pub fn to_relation(self) -> MethodTargetRelation {
        MethodTargetRelation {
            id: self.id,
            name: self.name,
            status: self.status,
            storage_method_id: self.storage_method_id,
            storage_target_id: self.storage_target_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct MediumRow {
    pub id: Uuid,
    pub medium_id: String,
    pub storage_target_id: Uuid,
    pub status: MediumStatus,
    pub location: String,
    pub location_status: LocationStatus,
    pub block_size: i32,
    pub format: i32,
    pub used_capacity: i64,
    pub num_of_mounts: i32,
    pub create_date: DateTime<Utc>,
    pub agent: String,
    pub tape_slot_id: Option<Uuid>,
    pub tape_drive_id: Option<Uuid>,
    pub last_changed_local: Option<DateTime<Utc>>,
    pub last_changed_external: Option<DateTime<Utc>>,
}

impl MediumRow {
    pub fn to_medium(self) -> StorageMedium {
        StorageMedium {
            id: self.id,
            medium_id: self.medium_id,
            storage_target_id: self.storage_target_id,
            status: self.status,
            location: self.location,
            location_status: self.location_status,
            block_size: self.block_size,
            format: self.format,
            used_capacity: self.used_capacity,
            num_of_mounts: self.num_of_mounts,
            create_date: self.create_date,
            agent: self.agent,
            tape_slot_id: self.tape_slot_id,
            tape_drive_id: self.tape_drive_id,
            last_changed_local: self.last_changed_local,
            last_changed_external: self.last_changed_external,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ObjectRow {
    pub id: Uuid,
    pub content_location_type: MediumClass,
    pub content_location_value: String,
    pub container: bool,
    pub ip_id: Uuid,
    pub storage_medium_id: Uuid,
    pub last_changed_local: Option<DateTime<Utc>>,
    pub last_changed_external: Option<DateTime<Utc>>,
}

impl ObjectRow {
    pub fn to_object(self) -> StorageObject {
        StorageObject {
            id: self.id,
            content_location_type: self.content_location_type,
            content_location_value: self.content_location_value,
            container: self.container,
            ip_id: self.ip_id,
            storage_medium_id: self.storage_medium_id,
            last_changed_local: self.last_changed_local,
            last_changed_external: self.last_changed_external,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct PackageRow {
    pub id: Uuid,
    pub object_identifier: String,
    pub active: bool,
    pub policy_id: Option<Uuid>,
    pub object_size: i64,
    pub message_digest: Option<String>,
    pub message_digest_algorithm: Option<String>,
    pub aic_identifier: Option<String>,
    pub container_format: String,
}

impl PackageRow {
    pub fn to_package(self) -> Result<InformationPackage> {
        let container_format: ContainerFormat = self
            .container_format
            .parse()
            .map_err(StorageError::Other)?;
        Ok(InformationPackage {
            id: self.id,
            object_identifier: self.object_identifier,
            active: self.active,
            policy_id: self.policy_id,
            object_size: self.object_size,
            message_digest: self.message_digest,
            message_digest_algorithm: self.message_digest_algorithm,
            aic_identifier: self.aic_identifier,
            container_format,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct RobotRow {
    pub id: Uuid,
    pub label: String,
    pub device: String,
    pub online: bool,
}

impl RobotRow {
    pub fn to_robot(self) -> Robot {
        Robot {
            id: self.id,
            label: self.label,
            device: self.device,
            online: self.online,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct DriveRow {
    pub id: Uuid,
    pub drive_id: i32,
    pub device: String,
    pub robot_id: Option<Uuid>,
    pub status: DeviceStatus,
    pub io_queue_entry_id: Option<Uuid>,
    pub num_of_mounts: i32,
    pub idle_time_secs: i64,
    pub locked: bool,
    pub last_change: DateTime<Utc>,
}

impl DriveRow {
    pub fn to_drive(self) -> TapeDrive {
        TapeDrive {
            id: self.id,
            drive_id: self.drive_id,
            device: self.device,
            robot_id: self.robot_id,
            status: self.status,
            io_queue_entry_id: self.io_queue_entry_id,
            num_of_mounts: self.num_of_mounts,
            idle_time_secs: self.idle_time_secs,
            locked: self.locked,
            last_change: self.last_change,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SlotRow {
    pub id: Uuid,
    pub slot_id: i32,
    pub medium_id: Option<String>,
    pub robot_id: Option<Uuid>,
    pub status: DeviceStatus,
}

impl SlotRow {
    pub fn to_slot(self) -> TapeSlot {
        TapeSlot {
            id: self.id,
            slot_id: self.slot_id,
            medium_id: self.medium_id,
            robot_id: self.robot_id,
            status: self.status,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct RobotQueueRow {
    pub id: Uuid,
    pub req_type: RobotReqType,
    pub status: QueueStatus,
    pub posted: DateTime<Utc>,
    pub storage_medium_id: Uuid,
    pub tape_drive_id: Option<Uuid>,
    pub robot_id: Option<Uuid>,
    pub io_queue_entry_id: Option<Uuid>,
}

impl RobotQueueRow {
    pub fn to_entry(self) -> RobotQueueEntry {
        RobotQueueEntry {
            id: self.id,
            req_type: self.req_type,
            status: self.status,
            posted: self.posted,
            storage_medium_id: self.storage_medium_id,
            tape_drive_id: self.tape_drive_id,
            robot_id: self.robot_id,
            io_queue_entry_id: self.io_queue_entry_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct IoQueueRow {
    pub id: Uuid,
    pub req_type: IoReqType,
    pub req_purpose: Option<String>,
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

impl IoQueueRow {
    pub fn to_entry(self) -> IoQueueEntry {
        IoQueueEntry {
            id: self.id,
            req_type: self.req_type,
            req_purpose: self.req_purpose,
            object_path: self.object_path,
            write_size: self.write_size,
            result: self.result,
            status: self.status,
            posted: self.posted,
            ip_id: self.ip_id,
            method_target_id: self.method_target_id,
            storage_medium_id: self.storage_medium_id,
            storage_object_id: self.storage_object_id,
            remote_status: self.remote_status,
            transfer_task_id: self.transfer_task_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_row_rejects_unknown_container_format() {
        let row = PackageRow {
            id: Uuid::new_v4(),
            object_identifier: "ip-0001".into(),
            active: true,
            policy_id: None,
            object_size: 0,
            message_digest: None,
            message_digest_algorithm: None,
            aic_identifier: None,
            container_format: "rar".into(),
        };
        assert!(row.to_package().is_err());
    }
}
