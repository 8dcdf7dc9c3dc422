//! Placements of packages on storage media.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::package::InformationPackage;
use crate::models::target::StorageTarget;
use crate::models::MediumClass;

/// One copy of one package on one medium.
///
/// `content_location_value` holds the tape position for tape media and a
/// relative path for disk media. An empty value on disk means the copy sits
/// under the package's own identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageObject {
    pub id: Uuid,
    pub content_location_type: MediumClass,
    pub content_location_value: String,
    /// Stored as a packed container rather than a directory tree.
    pub container: bool,
    pub ip_id: Uuid,
    pub storage_medium_id: Uuid,
    pub last_changed_local: Option<DateTime<Utc>>,
    pub last_changed_external: Option<DateTime<Utc>>,
}

impl StorageObject {
    /// Tape position of the copy. Unparseable or empty values count as
    /// position 0.
    pub fn position(&self) -> i64 {
        self.content_location_value.trim().parse().unwrap_or(0)
    }

    /// Where the copy lives on a disk or object-store target.
    pub fn path_on_target(&self, target: &StorageTarget, ip: &InformationPackage) -> PathBuf {
        let base = Path::new(&target.target);
        if self.content_location_value.is_empty() {
            if self.container {
                base.join(ip.container_name())
            } else {
                base.join(&ip.object_identifier)
            }
        } else {
            base.join(&self.content_location_value)
        }
    }

    pub fn check_db_sync(&self) -> bool {
        match (self.last_changed_local, self.last_changed_external) {
            (Some(local), Some(external)) => local == external,
            _ => false,
        }
    }
}

/// Sort key for choosing the fastest copy to read.
///
/// Local beats relayed, loose beats containerized, disk beats tape beats
/// object store, and earlier tape positions beat later ones.
pub fn fastest_key(object: &StorageObject, target: &StorageTarget) -> (u8, u8, u8, i64) {
    let remote = if target.has_remote_relay() { 2 } else { 1 };
    let container = if object.container { 2 } else { 1 };
    let class = match target.class() {
        MediumClass::Disk => 1,
        MediumClass::Tape => 2,
        MediumClass::Cas => 3,
    };
    let position = if object.content_location_type == MediumClass::Tape {
        object.position()
    } else {
        0
    };
    (remote, container, class, position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(medium_type: i32, remote: Option<&str>) -> StorageTarget {
        StorageTarget {
            id: Uuid::new_v4(),
            name: "t".into(),
            status: true,
            medium_type,
            default_block_size: 1024,
            default_format: 103,
            min_capacity_warning: 0,
            max_capacity: 0,
            remote_server: remote.map(str::to_string),
            master_server: None,
            target: "/archive".into(),
        }
    }

    fn object(class: MediumClass, value: &str, container: bool) -> StorageObject {
        StorageObject {
            id: Uuid::new_v4(),
            content_location_type: class,
            content_location_value: value.into(),
            container,
            ip_id: Uuid::new_v4(),
            storage_medium_id: Uuid::new_v4(),
            last_changed_local: None,
            last_changed_external: None,
        }
    }

    fn package() -> InformationPackage {
        InformationPackage {
            id: Uuid::new_v4(),
            object_identifier: "ip-0001".into(),
            active: true,
            policy_id: None,
            object_size: 0,
            message_digest: None,
            message_digest_algorithm: None,
            aic_identifier: None,
            container_format: crate::models::ContainerFormat::Tar,
        }
    }

    #[test]
    fn local_loose_disk_is_fastest() {
        let disk = target(200, None);
        let tape = target(305, None);
        let relayed_disk = target(200, Some("https://b.example.com,u,p"));

        let loose = fastest_key(&object(MediumClass::Disk, "", false), &disk);
        let packed = fastest_key(&object(MediumClass::Disk, "", true), &disk);
        let on_tape = fastest_key(&object(MediumClass::Tape, "2", false), &tape);
        let relayed = fastest_key(&object(MediumClass::Disk, "", false), &relayed_disk);

        assert!(loose < packed);
        assert!(packed < on_tape);
        assert!(loose < relayed);
        assert!(on_tape < relayed);
    }

    #[test]
    fn tape_positions_break_ties_ascending() {
        let tape = target(305, None);
        let early = fastest_key(&object(MediumClass::Tape, "2", false), &tape);
        let late = fastest_key(&object(MediumClass::Tape, "11", false), &tape);
        assert!(early < late);
    }

    #[test]
    fn object_store_sorts_last() {
        let cas = target(401, None);
        let tape = target(305, None);
        let on_cas = fastest_key(&object(MediumClass::Cas, "x", true), &cas);
        let on_tape = fastest_key(&object(MediumClass::Tape, "99999", true), &tape);
        assert!(on_tape < on_cas);
    }

    #[test]
    fn position_parses_or_defaults_to_zero() {
        assert_eq!(object(MediumClass::Tape, " 42 ", false).position(), 42);
        assert_eq!(object(MediumClass::Tape, "", false).position(), 0);
        assert_eq!(object(MediumClass::Disk, "a/b", false).position(), 0);
    }

    #[test]
    fn disk_path_falls_back_to_package_identifier() {
        let disk = target(200, None);
        let ip = package();
        let named = object(MediumClass::Disk, "custom/path", false);
        assert_eq!(
            named.path_on_target(&disk, &ip),
            PathBuf::from("/archive/custom/path")
        );
        let loose = object(MediumClass::Disk, "", false);
        assert_eq!(loose.path_on_target(&disk, &ip), PathBuf::from("/archive/ip-0001"));
        let packed = object(MediumClass::Disk, "", true);
        assert_eq!(
            packed.path_on_target(&disk, &ip),
            PathBuf::from("/archive/ip-0001.tar")
        );
    }
}
