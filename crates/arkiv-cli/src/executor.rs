//! Direct hardware job runner.
//!
//! Runs storage jobs in-process against the tape library and the placement
//! drivers. There is no queue behind it; `submit` executes the job before
//! returning.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use arkiv_core::{Result, StorageError};
use arkiv_db::StorageStore;
use arkiv_jobs::{JobExecutor, JobName, JobRequest};
use arkiv_services::ReadWritePath;
use arkiv_storage::tape::{load_tape, rewind_tape, unload_tape};

pub struct HardwareExecutor {
    store: Arc<dyn StorageStore>,
    readwrite: Arc<ReadWritePath>,
}

impl HardwareExecutor {
    pub fn new(store: Arc<dyn StorageStore>, readwrite: Arc<ReadWritePath>) -> Self {
        HardwareExecutor { store, readwrite }
    }

    async fn mount_tape(&self, request: &JobRequest) -> Result<serde_json::Value> {
        let params = request.mount_params().map_err(StorageError::Other)?;
        let medium = self
            .store
            .storage_medium(params.medium_id)
            .await?
            .ok_or_else(|| StorageError::not_found("storage medium", params.medium_id))?;
        if medium.tape_drive_id.is_some() {
            return Err(StorageError::TapeMounted {
                medium_id: medium.medium_id,
            });
        }
        let drive = self
            .store
            .tape_drive(params.drive_id)
            .await?
            .ok_or_else(|| StorageError::not_found("tape drive", params.drive_id))?;
        let robot_id = drive.robot_id.ok_or(StorageError::NoRobotAvailable)?;
        let robot = self
            .store
            .robot(robot_id)
            .await?
            .ok_or_else(|| StorageError::not_found("robot", robot_id))?;
        let slot_id = medium
            .tape_slot_id
            .ok_or_else(|| StorageError::not_found("tape slot of medium", medium.id))?;
        let slot = self
            .store
            .tape_slot(slot_id)
            .await?
            .ok_or_else(|| StorageError::not_found("tape slot", slot_id))?;

        load_tape(&robot.device, slot.slot_id, drive.drive_id).await?;
        rewind_tape(&drive.device).await?;
        Ok(json!({ "mounted": medium.id }))
    }

    async fn unmount_tape(&self, request: &JobRequest) -> Result<serde_json::Value> {
        let params = request.unmount_params().map_err(StorageError::Other)?;
        let drive = self
            .store
            .tape_drive(params.drive_id)
            .await?
            .ok_or_else(|| StorageError::not_found("tape drive", params.drive_id))?;
        let medium = self
            .store
            .mounted_medium_of_drive(drive.id)
            .await?
            .ok_or(StorageError::TapeUnmounted {
                medium_id: drive.device.clone(),
            })?;
        let robot_id = drive.robot_id.ok_or(StorageError::NoRobotAvailable)?;
        let robot = self
            .store
            .robot(robot_id)
            .await?
            .ok_or_else(|| StorageError::not_found("robot", robot_id))?;
        let slot_id = medium
            .tape_slot_id
            .ok_or_else(|| StorageError::not_found("tape slot of medium", medium.id))?;
        let slot = self
            .store
            .tape_slot(slot_id)
            .await?
            .ok_or_else(|| StorageError::not_found("tape slot", slot_id))?;

        rewind_tape(&drive.device).await?;
        unload_tape(&robot.device, slot.slot_id, drive.drive_id).await?;
        Ok(json!({ "unmounted": medium.id }))
    }

    async fn migrate_storage(&self, request: &JobRequest) -> Result<serde_json::Value> {
        let params = request.migrate_params().map_err(StorageError::Other)?;
        let ip_id = request.ip_id.ok_or_else(|| {
            StorageError::Other(anyhow::anyhow!("migration job carries no package"))
        })?;
        let object = self.readwrite.migrate(ip_id, params.storage_method_id).await?;
        Ok(json!({ "storage_object": object.map(|o| o.id) }))
    }
}

#[async_trait]
impl JobExecutor for HardwareExecutor {
    async fn submit(&self, request: JobRequest) -> Result<bool> {
        self.execute(request).await?;
        Ok(true)
    }

    async fn execute(&self, request: JobRequest) -> Result<serde_json::Value> {
        tracing::info!(job = %request.name, label = %request.label, "executing job");
        match request.name {
            JobName::MountTape => self.mount_tape(&request).await,
            JobName::UnmountTape => self.unmount_tape(&request).await,
            JobName::MigrateStorage => self.migrate_storage(&request).await,
        }
    }
}
