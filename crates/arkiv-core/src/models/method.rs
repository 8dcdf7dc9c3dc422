//! Storage methods, policies and method/target relations.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{CAS, DISK, TAPE};

/// The three medium classes a method (or a placement) can belong to.
///
/// Wire and database representation is the numeric class code; concrete
/// medium type codes (e.g. IBM-LTO5 = 305) classify into one of these by
/// range, see [`MediumClass::from_medium_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum MediumClass {
    Disk = DISK,
    Tape = TAPE,
    Cas = CAS,
}

impl MediumClass {
    /// Classify a concrete medium type code into its class.
    pub fn from_medium_type(medium_type: i32) -> Self {
        if (DISK..TAPE).contains(&medium_type) {
            MediumClass::Disk
        } else if (TAPE..CAS).contains(&medium_type) {
            MediumClass::Tape
        } else {
            MediumClass::Cas
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            DISK => Some(MediumClass::Disk),
            TAPE => Some(MediumClass::Tape),
            CAS => Some(MediumClass::Cas),
            _ => None,
        }
    }
}

impl From<MediumClass> for i32 {
    fn from(class: MediumClass) -> Self {
        class.as_i32()
    }
}

impl TryFrom<i32> for MediumClass {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        MediumClass::from_i32(value)
            .ok_or_else(|| anyhow::anyhow!("Invalid medium class code: {}", value))
    }
}

impl Display for MediumClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediumClass::Disk => write!(f, "DISK"),
            MediumClass::Tape => write!(f, "TAPE"),
            MediumClass::Cas => write!(f, "CAS"),
        }
    }
}

/// Status of one method/target relation.
///
/// `Disabled -> Enabled -> ReadOnly` is the normal aging of a target;
/// `Migrate` marks a target whose content must be copied elsewhere before it
/// can be retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum RelationStatus {
    Disabled = 0,
    Enabled = 1,
    ReadOnly = 2,
    Migrate = 3,
}

impl RelationStatus {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(RelationStatus::Disabled),
            1 => Some(RelationStatus::Enabled),
            2 => Some(RelationStatus::ReadOnly),
            3 => Some(RelationStatus::Migrate),
            _ => None,
        }
    }

    /// Relation statuses under which placements remain readable.
    pub fn is_readable(self) -> bool {
        matches!(
            self,
            RelationStatus::Enabled | RelationStatus::ReadOnly | RelationStatus::Migrate
        )
    }
}

impl From<RelationStatus> for i32 {
    fn from(status: RelationStatus) -> Self {
        status.as_i32()
    }
}

impl TryFrom<i32> for RelationStatus {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        RelationStatus::from_i32(value)
            .ok_or_else(|| anyhow::anyhow!("Invalid relation status code: {}", value))
    }
}

impl Display for RelationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RelationStatus::Disabled => write!(f, "Disabled"),
            RelationStatus::Enabled => write!(f, "Enabled"),
            RelationStatus::ReadOnly => write!(f, "ReadOnly"),
            RelationStatus::Migrate => write!(f, "Migrate"),
        }
    }
}

/// A preservation tier: disk, tape or CAS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageMethod {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub class: MediumClass,
    /// Served from another site rather than local hardware.
    pub remote: bool,
    /// Content is packaged into a single container file. Long-term tiers
    /// always package.
    pub containers: bool,
    pub cached: bool,
}

/// Relation between a [`StorageMethod`] and a [`StorageTarget`](crate::models::StorageTarget).
///
/// At most one relation per method may hold `Enabled` at a time; the store
/// enforces this on every status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodTargetRelation {
    pub id: Uuid,
    pub name: String,
    pub status: RelationStatus,
    pub storage_method_id: Uuid,
    pub storage_target_id: Uuid,
}

/// A named group of storage methods evaluated together by the migration
/// planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoragePolicy {
    pub id: Uuid,
    pub name: String,
    pub storage_methods: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_type_codes_classify_by_range() {
        assert_eq!(MediumClass::from_medium_type(200), MediumClass::Disk);
        assert_eq!(MediumClass::from_medium_type(250), MediumClass::Disk);
        assert_eq!(MediumClass::from_medium_type(301), MediumClass::Tape);
        assert_eq!(MediumClass::from_medium_type(326), MediumClass::Tape);
        assert_eq!(MediumClass::from_medium_type(401), MediumClass::Cas);
        assert_eq!(MediumClass::from_medium_type(999), MediumClass::Cas);
    }

    #[test]
    fn relation_status_readability() {
        assert!(RelationStatus::Enabled.is_readable());
        assert!(RelationStatus::ReadOnly.is_readable());
        assert!(RelationStatus::Migrate.is_readable());
        assert!(!RelationStatus::Disabled.is_readable());
    }

    #[test]
    fn medium_class_serializes_as_code() {
        let json = serde_json::to_string(&MediumClass::Tape).unwrap();
        assert_eq!(json, "300");
        let class: MediumClass = serde_json::from_str("200").unwrap();
        assert_eq!(class, MediumClass::Disk);
        assert!(serde_json::from_str::<MediumClass>("123").is_err());
    }
}
