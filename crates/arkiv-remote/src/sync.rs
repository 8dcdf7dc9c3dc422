//! Replication of topology state between sites.
//!
//! Pulls fetch the remote site's representation of an entity and upsert it
//! locally by primary identifier, recursively pulling referenced entities
//! first. The remote payload's own change timestamp is recorded as
//! `last_changed_external`, which is what the drift check on media and
//! placements compares against.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use arkiv_core::models::{
    DeviceStatus, IoQueueEntry, LocationStatus, MediumClass, MediumStatus, Robot, StorageMedium,
    StorageObject, TapeDrive, TapeSlot,
};
use arkiv_core::{Result, StorageError};
use arkiv_db::{PullBatch, StorageStore};

use crate::client::SiteClient;

// Wire payloads mirror the remote detail endpoints: foreign keys come over
// as bare ids, display-only fields are ignored by deserialization.

#[derive(Debug, Deserialize)]
struct RobotPayload {
    id: Uuid,
    label: String,
    device: String,
    online: bool,
}

#[derive(Debug, Deserialize)]
struct TapeSlotPayload {
    id: Uuid,
    slot_id: i32,
    medium_id: Option<String>,
    robot: Option<Uuid>,
    status: i32,
}

#[derive(Debug, Deserialize)]
struct TapeDrivePayload {
    id: Uuid,
    drive_id: i32,
    device: String,
    robot: Option<Uuid>,
    status: i32,
    io_queue_entry: Option<Uuid>,
    num_of_mounts: i32,
    idle_time: i64,
    locked: bool,
    last_change: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct StorageMediumPayload {
    id: Uuid,
    medium_id: String,
    status: i32,
    location: String,
    location_status: i32,
    block_size: i32,
    format: i32,
    used_capacity: i64,
    num_of_mounts: i32,
    create_date: DateTime<Utc>,
    agent: String,
    storage_target: Uuid,
    tape_slot: Option<Uuid>,
    tape_drive: Option<Uuid>,
    last_changed_local: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct StorageObjectPayload {
    id: Uuid,
    container: bool,
    content_location_type: i32,
    content_location_value: String,
    ip: Uuid,
    storage_medium: Uuid,
    last_changed_local: Option<DateTime<Utc>>,
}

fn bad_payload(entity: &'static str, detail: impl std::fmt::Display) -> StorageError {
    StorageError::Remote {
        status: 200,
        message: format!("invalid {} payload: {}", entity, detail),
    }
}

/// Pull/push of topology entities against one remote site.
pub struct ReplicationSync {
    client: SiteClient,
    store: Arc<dyn StorageStore>,
}

impl ReplicationSync {
    pub fn new(client: SiteClient, store: Arc<dyn StorageStore>) -> Self {
        ReplicationSync { client, store }
    }

    pub async fn pull_robot(&self, id: Uuid) -> Result<Robot> {
        let mut batch = PullBatch::default();
        let robot = self.fetch_robot(id, &mut batch).await?;
        self.store.apply_pull(&batch).await?;
        Ok(robot)
    }

    pub async fn pull_tape_slot(&self, id: Uuid) -> Result<TapeSlot> {
        let mut batch = PullBatch::default();
        let slot = self.fetch_tape_slot(id, &mut batch).await?;
        self.store.apply_pull(&batch).await?;
        Ok(slot)
    }

    pub async fn pull_tape_drive(&self, id: Uuid) -> Result<TapeDrive> {
        let mut batch = PullBatch::default();
        let drive = self.fetch_tape_drive(id, &mut batch).await?;
        self.store.apply_pull(&batch).await?;
        Ok(drive)
    }

    /// Pull a medium together with the drive and slot it references. The
    /// target itself is configuration and must already exist locally.
    pub async fn pull_storage_medium(&self, id: Uuid) -> Result<StorageMedium> {
        let mut batch = PullBatch::default();
        let medium = self.fetch_storage_medium(id, &mut batch).await?;
        self.store.apply_pull(&batch).await?;
        tracing::info!(medium = %medium.medium_id, "pulled storage medium from remote");
        Ok(medium)
    }

    /// Pull a placement together with the medium it sits on.
    pub async fn pull_storage_object(&self, id: Uuid) -> Result<StorageObject> {
        let mut batch = PullBatch::default();
        let object = self.fetch_storage_object(id, &mut batch).await?;
        self.store.apply_pull(&batch).await?;
        Ok(object)
    }

    // The fetch methods gather remote state without writing anything; each
    // pull commits its whole batch in one store write so a failure partway
    // through leaves the local topology as it was.

    async fn fetch_robot(&self, id: Uuid, batch: &mut PullBatch) -> Result<Robot> {
        if let Some(robot) = batch.robots.iter().find(|r| r.id == id) {
            return Ok(robot.clone());
        }
        let payload: RobotPayload = self.client.get_json(&format!("/api/robots/{}/", id)).await?;
        let robot = Robot {
            id: payload.id,
            label: payload.label,
            device: payload.device,
            online: payload.online,
        };
        batch.robots.push(robot.clone());
        tracing::debug!(robot = %robot.id, "fetched robot from remote");
        Ok(robot)
    }

    async fn fetch_tape_slot(&self, id: Uuid, batch: &mut PullBatch) -> Result<TapeSlot> {
        let payload: TapeSlotPayload = self
            .client
            .get_json(&format!("/api/tape-slots/{}/", id))
            .await?;
        if let Some(robot_id) = payload.robot {
            self.fetch_robot(robot_id, batch).await?;
        }
        let slot = TapeSlot {
            id: payload.id,
            slot_id: payload.slot_id,
            medium_id: payload.medium_id,
            robot_id: payload.robot,
            status: DeviceStatus::from_i32(payload.status)
                .ok_or_else(|| bad_payload("tape slot", payload.status))?,
        };
        batch.tape_slots.push(slot.clone());
        Ok(slot)
    }

    async fn fetch_tape_drive(&self, id: Uuid, batch: &mut PullBatch) -> Result<TapeDrive> {
        let payload: TapeDrivePayload = self
            .client
            .get_json(&format!("/api/tape-drives/{}/", id))
            .await?;
        if let Some(robot_id) = payload.robot {
            self.fetch_robot(robot_id, batch).await?;
        }
        let drive = TapeDrive {
            id: payload.id,
            drive_id: payload.drive_id,
            device: payload.device,
            robot_id: payload.robot,
            status: DeviceStatus::from_i32(payload.status)
                .ok_or_else(|| bad_payload("tape drive", payload.status))?,
            io_queue_entry_id: payload.io_queue_entry,
            num_of_mounts: payload.num_of_mounts,
            idle_time_secs: payload.idle_time,
            locked: payload.locked,
            last_change: payload.last_change,
        };
        batch.tape_drives.push(drive.clone());
        Ok(drive)
    }

    async fn fetch_storage_medium(
        &self,
        id: Uuid,
        batch: &mut PullBatch,
    ) -> Result<StorageMedium> {
        let payload: StorageMediumPayload = self
            .client
            .get_json(&format!("/api/storage-mediums/{}/", id))
            .await?;
        if let Some(drive_id) = payload.tape_drive {
            self.fetch_tape_drive(drive_id, batch).await?;
        }
        if let Some(slot_id) = payload.tape_slot {
            self.fetch_tape_slot(slot_id, batch).await?;
        }
        let medium = StorageMedium {
            id: payload.id,
            medium_id: payload.medium_id,
            storage_target_id: payload.storage_target,
            status: MediumStatus::from_i32(payload.status)
                .ok_or_else(|| bad_payload("storage medium", payload.status))?,
            location: payload.location,
            location_status: LocationStatus::from_i32(payload.location_status)
                .ok_or_else(|| bad_payload("storage medium", payload.location_status))?,
            block_size: payload.block_size,
            format: payload.format,
            used_capacity: payload.used_capacity,
            num_of_mounts: payload.num_of_mounts,
            create_date: payload.create_date,
            agent: payload.agent,
            tape_slot_id: payload.tape_slot,
            tape_drive_id: payload.tape_drive,
            last_changed_local: Some(Utc::now()),
            last_changed_external: payload.last_changed_local,
        };
        batch.media.push(medium.clone());
        Ok(medium)
    }

    async fn fetch_storage_object(
        &self,
        id: Uuid,
        batch: &mut PullBatch,
    ) -> Result<StorageObject> {
        let payload: StorageObjectPayload = self
            .client
            .get_json(&format!("/api/storage-objects/{}/", id))
            .await?;
        self.fetch_storage_medium(payload.storage_medium, batch)
            .await?;
        let object = StorageObject {
            id: payload.id,
            content_location_type: MediumClass::from_i32(payload.content_location_type)
                .ok_or_else(|| bad_payload("storage object", payload.content_location_type))?,
            content_location_value: payload.content_location_value,
            container: payload.container,
            ip_id: payload.ip,
            storage_medium_id: payload.storage_medium,
            last_changed_local: Some(Utc::now()),
            last_changed_external: payload.last_changed_local,
        };
        batch.objects.push(object.clone());
        Ok(object)
    }

    /// Push the local state of an I/O entry to the master that requested it.
    /// The master keeps its own hardware inventory, so nested drive and slot
    /// objects are stripped before the PATCH.
    pub async fn push_io_entry(&self, entry: &IoQueueEntry) -> Result<()> {
        let mut data = self.io_entry_payload(entry).await?;
        strip_hardware_refs(&mut data);
        self.client
            .patch_json(&format!("/api/io-queue/{}/", entry.id), &data)
            .await?;
        tracing::info!(entry = %entry.id, "synced io queue entry with master");
        Ok(())
    }

    async fn io_entry_payload(&self, entry: &IoQueueEntry) -> Result<serde_json::Value> {
        let mut data = serde_json::to_value(entry)
            .map_err(|e| StorageError::Other(anyhow::anyhow!("serialize io entry: {e}")))?;

        if let Some(object_id) = entry.storage_object_id {
            if let Some(object) = self.store.storage_object(object_id).await? {
                let mut object_value = serde_json::to_value(&object)
                    .map_err(|e| StorageError::Other(anyhow::anyhow!("serialize placement: {e}")))?;
                if let Some(medium) = self.store.storage_medium(object.storage_medium_id).await? {
                    object_value["storage_medium"] = serde_json::to_value(&medium).map_err(|e| {
                        StorageError::Other(anyhow::anyhow!("serialize medium: {e}"))
                    })?;
                }
                data["storage_object"] = object_value;
            }
        }
        Ok(data)
    }
}

/// Drop tape drive/slot references from a nested medium payload.
fn strip_hardware_refs(data: &mut serde_json::Value) {
    if let Some(medium) = data
        .get_mut("storage_object")
        .and_then(|o| o.get_mut("storage_medium"))
        .and_then(|m| m.as_object_mut())
    {
        medium.remove("tape_slot_id");
        medium.remove("tape_drive_id");
    }
}
