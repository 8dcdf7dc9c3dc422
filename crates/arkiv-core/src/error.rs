//! Error types module
//!
//! All storage-layer failures are unified under the `StorageError` enum.
//! Every variant maps onto one `ErrorKind`, which is what retry loops and
//! queue pollers branch on: resource shortages are retried later by the
//! caller, contention signals a stale queue entry or a race, verification
//! failures poison the medium, and only transient network errors are retried
//! automatically.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx`
//! feature so the model types stay usable in minimal builds.

use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

use crate::models::MediumClass;

/// Broad failure classes, used for retry and alerting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No target, medium, drive or robot is available right now.
    ResourceUnavailable,
    /// The hardware is held by another owner or a stale queue entry.
    Contention,
    /// Stored content did not match its expected digest.
    Verification,
    /// Timeout or connection failure talking to another site.
    TransientNetwork,
    /// The remote site rejected the request; retrying will not help.
    PermanentRemote,
    /// Anything else: database faults, bad configuration, bugs.
    Internal,
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no enabled target for storage method {method_id}")]
    NoTargetAvailable { method_id: Uuid },

    #[error("no medium available for allocation on target '{target}'")]
    NoMediumAvailable { target: String },

    #[error("no tape drive available")]
    NoDriveAvailable,

    #[error("no robot available")]
    NoRobotAvailable,

    #[error("tape {medium_id} already mounted")]
    TapeMounted { medium_id: String },

    #[error("tape {medium_id} already unmounted")]
    TapeUnmounted { medium_id: String },

    #[error("tape {medium_id} is not mounted")]
    TapeNotMounted { medium_id: String },

    #[error("tape {medium_id} already mounted and locked by another request")]
    TapeMountedAndLockedByOther { medium_id: String },

    #[error("tape drive {device} is locked")]
    TapeDriveLocked { device: String },

    #[error("content verification failed for {subject}: {message}")]
    Verification { subject: String, message: String },

    #[error("operation not supported for {class} media")]
    UnsupportedMediumClass { class: MediumClass },

    #[error("malformed connection string, expected 'host,user,password'")]
    BadConnectionString,

    #[error("network failure talking to remote site: {message}")]
    Network { message: String },

    #[error("remote site rejected request with status {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("remote job failed: {message}")]
    RemoteJobFailed { message: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[cfg(feature = "sqlx")]
    #[error("database error: {0}")]
    Database(#[from] SqlxError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NoTargetAvailable { .. }
            | StorageError::NoMediumAvailable { .. }
            | StorageError::NoDriveAvailable
            | StorageError::NoRobotAvailable
            | StorageError::TapeNotMounted { .. } => ErrorKind::ResourceUnavailable,

            StorageError::TapeMounted { .. }
            | StorageError::TapeUnmounted { .. }
            | StorageError::TapeMountedAndLockedByOther { .. }
            | StorageError::TapeDriveLocked { .. } => ErrorKind::Contention,

            StorageError::Verification { .. } => ErrorKind::Verification,

            StorageError::Network { .. } => ErrorKind::TransientNetwork,

            StorageError::Remote { .. } | StorageError::RemoteJobFailed { .. } => {
                ErrorKind::PermanentRemote
            }

            StorageError::UnsupportedMediumClass { .. }
            | StorageError::BadConnectionString
            | StorageError::NotFound { .. }
            | StorageError::Other(_) => ErrorKind::Internal,

            #[cfg(feature = "sqlx")]
            StorageError::Database(_) => ErrorKind::Internal,
        }
    }

    /// Whether a bounded retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientNetwork
    }

    pub fn is_contention(&self) -> bool {
        self.kind() == ErrorKind::Contention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_drive_retry_decisions() {
        let err = StorageError::Network {
            message: "connection reset".into(),
        };
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(err.is_transient());

        let err = StorageError::Remote {
            status: 404,
            message: "not found".into(),
        };
        assert_eq!(err.kind(), ErrorKind::PermanentRemote);
        assert!(!err.is_transient());

        let err = StorageError::TapeDriveLocked {
            device: "/dev/nst0".into(),
        };
        assert!(err.is_contention());

        let err = StorageError::NoDriveAvailable;
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
    }

    #[test]
    fn not_found_formats_entity_and_id() {
        let id = Uuid::nil();
        let err = StorageError::not_found("storage medium", id);
        assert_eq!(
            err.to_string(),
            format!("storage medium {} not found", id)
        );
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
