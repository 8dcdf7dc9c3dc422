//! Builders for topology and hardware records with sensible defaults.
//!
//! Each builder returns a fully populated record; tests override the fields
//! they care about.

use chrono::Utc;
use uuid::Uuid;

use arkiv_core::models::tape::DEFAULT_IDLE_TIME_SECS;
use arkiv_core::models::{
    ContainerFormat, DeviceStatus, InformationPackage, LocationStatus, MediumClass,
    MediumStatus, MethodTargetRelation, RelationStatus, Robot, StorageMedium, StorageMethod,
    StorageObject, StoragePolicy, StorageTarget, TapeDrive, TapeSlot,
};

pub fn policy(name: &str, storage_methods: Vec<Uuid>) -> StoragePolicy {
    StoragePolicy {
        id: Uuid::new_v4(),
        name: name.into(),
        storage_methods,
    }
}

pub fn method(name: &str, class: MediumClass) -> StorageMethod {
    StorageMethod {
        id: Uuid::new_v4(),
        name: name.into(),
        enabled: true,
        class,
        remote: false,
        containers: class == MediumClass::Tape,
        cached: false,
    }
}

pub fn disk_target(name: &str) -> StorageTarget {
    StorageTarget {
        id: Uuid::new_v4(),
        name: name.into(),
        status: true,
        medium_type: 200,
        default_block_size: 1024,
        default_format: 103,
        min_capacity_warning: 0,
        max_capacity: 0,
        remote_server: None,
        master_server: None,
        target: format!("/archive/{}", name),
    }
}

/// Tape pool target; `prefix` is the barcode prefix new media are drawn from.
pub fn tape_target(name: &str, prefix: &str) -> StorageTarget {
    StorageTarget {
        id: Uuid::new_v4(),
        name: name.into(),
        status: true,
        medium_type: 305,
        default_block_size: 1024,
        default_format: 103,
        min_capacity_warning: 0,
        max_capacity: 0,
        remote_server: None,
        master_server: None,
        target: prefix.into(),
    }
}

pub fn relation(method: Uuid, target: Uuid, status: RelationStatus) -> MethodTargetRelation {
    MethodTargetRelation {
        id: Uuid::new_v4(),
        name: String::new(),
        status,
        storage_method_id: method,
        storage_target_id: target,
    }
}

pub fn medium(target: &StorageTarget) -> StorageMedium {
    StorageMedium {
        id: Uuid::new_v4(),
        medium_id: "ST0001".into(),
        storage_target_id: target.id,
        status: MediumStatus::Write,
        location: "Media".into(),
        location_status: LocationStatus::Robot,
        block_size: target.default_block_size,
        format: target.default_format,
        used_capacity: 0,
        num_of_mounts: 0,
        create_date: Utc::now(),
        agent: "site-a".into(),
        tape_slot_id: None,
        tape_drive_id: None,
        last_changed_local: Some(Utc::now()),
        last_changed_external: None,
    }
}

pub fn object(ip_id: Uuid, medium_id: Uuid) -> StorageObject {
    StorageObject {
        id: Uuid::new_v4(),
        content_location_type: MediumClass::Disk,
        content_location_value: String::new(),
        container: false,
        ip_id,
        storage_medium_id: medium_id,
        last_changed_local: Some(Utc::now()),
        last_changed_external: None,
    }
}

pub fn package(policy_id: Uuid) -> InformationPackage {
    let id = Uuid::new_v4();
    InformationPackage {
        id,
        object_identifier: format!("ip-{}", id.simple()),
        active: true,
        policy_id: Some(policy_id),
        object_size: 0,
        message_digest: None,
        message_digest_algorithm: None,
        aic_identifier: None,
        container_format: ContainerFormat::Tar,
    }
}

pub fn robot(label: &str) -> Robot {
    Robot {
        id: Uuid::new_v4(),
        label: label.into(),
        device: "/dev/sg4".into(),
        online: true,
    }
}

pub fn drive(drive_id: i32, device: &str) -> TapeDrive {
    TapeDrive {
        id: Uuid::new_v4(),
        drive_id,
        device: device.into(),
        robot_id: None,
        status: DeviceStatus::Write,
        io_queue_entry_id: None,
        num_of_mounts: 0,
        idle_time_secs: DEFAULT_IDLE_TIME_SECS,
        locked: false,
        last_change: Utc::now(),
    }
}

pub fn slot(slot_id: i32, barcode: &str) -> TapeSlot {
    TapeSlot {
        id: Uuid::new_v4(),
        slot_id,
        medium_id: Some(barcode.to_string()),
        robot_id: None,
        status: DeviceStatus::Write,
    }
}
