//! Placement driver abstraction
//!
//! This module defines the PlacementDriver trait that all medium drivers
//! must implement.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use arkiv_core::models::{
    InformationPackage, MediumClass, StorageMedium, StorageObject, StorageTarget,
};

/// Driver operation errors
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Placement not found: {0}")]
    NotFound(String),

    #[error("Invalid placement path: {0}")]
    InvalidPath(String),

    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Tape drive not ready: {0}")]
    DriveNotReady(String),

    #[error("Medium class not supported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

impl From<DriverError> for arkiv_core::StorageError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotFound(what) => arkiv_core::StorageError::NotFound {
                entity: "placement",
                id: what,
            },
            other => arkiv_core::StorageError::Other(anyhow::Error::new(other)),
        }
    }
}

/// One write onto a single medium. Sources are files or directories already
/// prepared in their final shape (container plus description documents, or a
/// loose content tree).
pub struct WriteRequest<'a> {
    pub sources: &'a [PathBuf],
    pub target: &'a StorageTarget,
    pub medium: &'a StorageMedium,
    /// Device node of the drive the medium is mounted in. Tape only.
    pub drive_device: Option<&'a str>,
    /// Tape position to write at. Tape only.
    pub position: Option<i64>,
}

/// One read of a placement into a destination directory.
pub struct ReadRequest<'a> {
    pub object: &'a StorageObject,
    pub package: &'a InformationPackage,
    pub target: &'a StorageTarget,
    pub medium: &'a StorageMedium,
    /// Device node of the drive the medium is mounted in. Tape only.
    pub drive_device: Option<&'a str>,
    pub destination: &'a Path,
    /// Also fetch the description documents next to a container. Ignored on
    /// tape, where everything at the position comes out together.
    pub include_xml: bool,
}

/// Driver abstraction trait
///
/// One implementation per medium class. Drivers move bytes only; queue and
/// inventory bookkeeping stays with the caller.
#[async_trait]
pub trait PlacementDriver: Send + Sync {
    /// Write the prepared sources onto the medium and return the content
    /// location value to record for the placement.
    async fn write(&self, request: WriteRequest<'_>) -> DriverResult<String>;

    /// Materialize the placement into `destination` and return the path of
    /// the primary artifact: the container file, or the content directory.
    async fn read(&self, request: ReadRequest<'_>) -> DriverResult<PathBuf>;

    /// The medium class this driver serves.
    fn class(&self) -> MediumClass;
}
