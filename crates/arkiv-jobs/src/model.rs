//! Job names and typed parameter payloads.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The units of work the storage core submits to the execution engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobName {
    MountTape,
    UnmountTape,
    MigrateStorage,
}

impl Display for JobName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobName::MountTape => write!(f, "mount_tape"),
            JobName::UnmountTape => write!(f, "unmount_tape"),
            JobName::MigrateStorage => write!(f, "migrate_storage"),
        }
    }
}

impl FromStr for JobName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mount_tape" => Ok(JobName::MountTape),
            "unmount_tape" => Ok(JobName::UnmountTape),
            "migrate_storage" => Ok(JobName::MigrateStorage),
            _ => Err(anyhow::anyhow!("Invalid job name: {}", s)),
        }
    }
}

/// Parameters for a physical tape mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountTapeParams {
    pub medium_id: Uuid,
    pub drive_id: Uuid,
}

/// Parameters for a physical tape unmount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmountTapeParams {
    pub drive_id: Uuid,
}

/// Parameters for copying one package to one storage method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateStorageParams {
    pub storage_method_id: Uuid,
    pub temp_path: String,
}

/// One named unit of work with its parameters and package context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: JobName,
    pub label: String,
    /// Package the job acts on. Part of the idempotency key.
    pub ip_id: Option<Uuid>,
    pub params: serde_json::Value,
}

impl JobRequest {
    pub fn mount_tape(params: MountTapeParams) -> Self {
        JobRequest {
            name: JobName::MountTape,
            label: format!("Mount {}", params.medium_id),
            ip_id: None,
            params: serde_json::to_value(params).unwrap_or_default(),
        }
    }

    pub fn unmount_tape(params: UnmountTapeParams) -> Self {
        JobRequest {
            name: JobName::UnmountTape,
            label: format!("Unmount drive {}", params.drive_id),
            ip_id: None,
            params: serde_json::to_value(params).unwrap_or_default(),
        }
    }

    pub fn migrate_storage(ip_id: Uuid, params: MigrateStorageParams) -> Self {
        JobRequest {
            name: JobName::MigrateStorage,
            label: format!("Migrate to {}", params.storage_method_id),
            ip_id: Some(ip_id),
            params: serde_json::to_value(params).unwrap_or_default(),
        }
    }

    pub fn mount_params(&self) -> anyhow::Result<MountTapeParams> {
        Ok(serde_json::from_value(self.params.clone())?)
    }

    pub fn unmount_params(&self) -> anyhow::Result<UnmountTapeParams> {
        Ok(serde_json::from_value(self.params.clone())?)
    }

    pub fn migrate_params(&self) -> anyhow::Result<MigrateStorageParams> {
        Ok(serde_json::from_value(self.params.clone())?)
    }
}
