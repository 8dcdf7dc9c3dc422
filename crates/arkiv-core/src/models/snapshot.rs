//! In-memory view of the storage topology.
//!
//! A snapshot is loaded in one shot and queried with pure functions, so
//! migration decisions are reproducible and testable without a database.

use uuid::Uuid;

use crate::models::medium::{LocationStatus, MediumStatus, StorageMedium};
use crate::models::method::{
    MethodTargetRelation, RelationStatus, StorageMethod, StoragePolicy,
};
use crate::models::object::{fastest_key, StorageObject};
use crate::models::package::InformationPackage;
use crate::models::target::StorageTarget;

#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    pub policies: Vec<StoragePolicy>,
    pub methods: Vec<StorageMethod>,
    pub targets: Vec<StorageTarget>,
    pub relations: Vec<MethodTargetRelation>,
    pub media: Vec<StorageMedium>,
    pub objects: Vec<StorageObject>,
    pub packages: Vec<InformationPackage>,
}

impl TopologySnapshot {
    pub fn policy(&self, id: Uuid) -> Option<&StoragePolicy> {
        self.policies.iter().find(|p| p.id == id)
    }

    pub fn method(&self, id: Uuid) -> Option<&StorageMethod> {
        self.methods.iter().find(|m| m.id == id)
    }

    pub fn target(&self, id: Uuid) -> Option<&StorageTarget> {
        self.targets.iter().find(|t| t.id == id)
    }

    pub fn medium(&self, id: Uuid) -> Option<&StorageMedium> {
        self.media.iter().find(|m| m.id == id)
    }

    pub fn package(&self, id: Uuid) -> Option<&InformationPackage> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub fn target_of_medium(&self, medium: &StorageMedium) -> Option<&StorageTarget> {
        self.target(medium.storage_target_id)
    }

    /// The single relation a method currently writes through.
    pub fn enabled_relation(&self, method_id: Uuid) -> Option<&MethodTargetRelation> {
        self.relations
            .iter()
            .find(|r| r.storage_method_id == method_id && r.status == RelationStatus::Enabled)
    }

    pub fn relations_of_target(
        &self,
        target_id: Uuid,
    ) -> impl Iterator<Item = &MethodTargetRelation> {
        self.relations
            .iter()
            .filter(move |r| r.storage_target_id == target_id)
    }

    pub fn objects_on_medium(&self, medium_id: Uuid) -> impl Iterator<Item = &StorageObject> {
        self.objects
            .iter()
            .filter(move |o| o.storage_medium_id == medium_id)
    }

    pub fn package_objects(&self, ip_id: Uuid) -> impl Iterator<Item = &StorageObject> {
        self.objects.iter().filter(move |o| o.ip_id == ip_id)
    }

    /// Whether the package already has a copy under `method_id`, through any
    /// relation regardless of its status.
    pub fn package_has_object_in_method(&self, ip_id: Uuid, method_id: Uuid) -> bool {
        self.package_objects(ip_id).any(|obj| {
            self.medium(obj.storage_medium_id).is_some_and(|medium| {
                self.relations_of_target(medium.storage_target_id)
                    .any(|r| r.storage_method_id == method_id)
            })
        })
    }

    /// The method migrating away from `target_id`, when one exists.
    pub fn migrate_method_of_target(&self, target_id: Uuid) -> Option<&StorageMethod> {
        self.relations
            .iter()
            .find(|r| {
                r.storage_target_id == target_id && r.status == RelationStatus::Migrate
            })
            .and_then(|r| self.method(r.storage_method_id))
    }

    /// True when the medium still holds an object whose package has no copy
    /// on any target the migrate method currently writes to.
    ///
    /// Without a migrate method every object counts as non-migrated.
    pub fn has_non_migrated_object(&self, medium: &StorageMedium, include_inactive: bool) -> bool {
        let destination_targets: Vec<Uuid> = self
            .migrate_method_of_target(medium.storage_target_id)
            .map(|method| {
                self.relations
                    .iter()
                    .filter(|r| {
                        r.storage_method_id == method.id && r.status == RelationStatus::Enabled
                    })
                    .map(|r| r.storage_target_id)
                    .collect()
            })
            .unwrap_or_default();

        self.objects_on_medium(medium.id)
            .filter(|obj| {
                include_inactive || self.package(obj.ip_id).is_some_and(|ip| ip.active)
            })
            .any(|obj| {
                !self.package_objects(obj.ip_id).any(|other| {
                    self.medium(other.storage_medium_id)
                        .is_some_and(|m| destination_targets.contains(&m.storage_target_id))
                })
            })
    }

    /// True when an object on the medium belongs to a package missing its
    /// copy in some other enabled method of the package's policy.
    pub fn missing_object_in_other_method(&self, medium: &StorageMedium) -> bool {
        let own_method = self
            .relations_of_target(medium.storage_target_id)
            .find(|r| r.status.is_readable())
            .map(|r| r.storage_method_id);
        let Some(own_method) = own_method else {
            return false;
        };

        self.objects_on_medium(medium.id).any(|obj| {
            let Some(policy) = self
                .package(obj.ip_id)
                .and_then(|ip| ip.policy_id)
                .and_then(|id| self.policy(id))
            else {
                return false;
            };
            self.relations.iter().any(|r| {
                r.storage_method_id != own_method
                    && r.status == RelationStatus::Enabled
                    && policy.storage_methods.contains(&r.storage_method_id)
                    && !self.package_has_object_in_method(obj.ip_id, r.storage_method_id)
            })
        })
    }

    /// A medium is migratable when content on it still has somewhere to go:
    /// either its target is being migrated to an enabled destination, or one
    /// of its packages lacks a copy in another enabled method.
    pub fn medium_migratable(&self, medium: &StorageMedium) -> bool {
        if !medium.status.is_active() {
            return false;
        }
        let has_enabled_destination = self
            .migrate_method_of_target(medium.storage_target_id)
            .is_some_and(|method| self.enabled_relation(method.id).is_some());
        (has_enabled_destination && self.has_non_migrated_object(medium, false))
            || self.missing_object_in_other_method(medium)
    }

    /// A medium can be deactivated once its target is flagged for migration
    /// and every object on it has been copied off.
    pub fn medium_deactivatable(&self, medium: &StorageMedium, include_inactive: bool) -> bool {
        if !medium.status.is_active() {
            return false;
        }
        let flagged = self
            .relations_of_target(medium.storage_target_id)
            .any(|r| r.status == RelationStatus::Migrate);
        flagged && !self.has_non_migrated_object(medium, include_inactive)
    }

    /// A placement can be read when its medium holds content and sits in
    /// the robot, its target is available, and the target is reachable
    /// through a readable relation of an enabled method.
    pub fn object_readable(&self, object: &StorageObject) -> bool {
        let Some(medium) = self.medium(object.storage_medium_id) else {
            return false;
        };
        if !matches!(medium.status, MediumStatus::Write | MediumStatus::Full) {
            return false;
        }
        if medium.location_status != LocationStatus::Robot {
            return false;
        }
        if !self
            .target(medium.storage_target_id)
            .is_some_and(|t| t.status)
        {
            return false;
        }
        self.relations_of_target(medium.storage_target_id).any(|r| {
            r.status.is_readable()
                && self.method(r.storage_method_id).is_some_and(|m| m.enabled)
        })
    }

    /// The readable placement that is cheapest to serve, see
    /// [`fastest_key`].
    pub fn fastest_readable_object(&self, ip_id: Uuid) -> Option<&StorageObject> {
        self.package_objects(ip_id)
            .filter(|obj| self.object_readable(obj))
            .filter_map(|obj| {
                let medium = self.medium(obj.storage_medium_id)?;
                let target = self.target(medium.storage_target_id)?;
                Some((fastest_key(obj, target), obj))
            })
            .min_by_key(|(key, _)| *key)
            .map(|(_, obj)| obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerFormat, LocationStatus, MediumClass};
    use chrono::Utc;

    struct Fixture {
        snapshot: TopologySnapshot,
        policy_id: Uuid,
        old_method: Uuid,
        new_method: Uuid,
        old_target: Uuid,
        new_target: Uuid,
        old_medium: Uuid,
        ip: Uuid,
    }

    fn method(id: Uuid, name: &str, class: MediumClass) -> StorageMethod {
        StorageMethod {
            id,
            name: name.into(),
            enabled: true,
            class,
            remote: false,
            containers: class == MediumClass::Tape,
            cached: false,
        }
    }

    fn target(id: Uuid, name: &str, medium_type: i32) -> StorageTarget {
        StorageTarget {
            id,
            name: name.into(),
            status: true,
            medium_type,
            default_block_size: 1024,
            default_format: 103,
            min_capacity_warning: 0,
            max_capacity: 0,
            remote_server: None,
            master_server: None,
            target: format!("/archive/{}", name),
        }
    }

    fn relation(method: Uuid, target: Uuid, status: RelationStatus) -> MethodTargetRelation {
        MethodTargetRelation {
            id: Uuid::new_v4(),
            name: String::new(),
            status,
            storage_method_id: method,
            storage_target_id: target,
        }
    }

    fn medium(id: Uuid, target: Uuid, status: MediumStatus) -> StorageMedium {
        StorageMedium {
            id,
            medium_id: "ST0001".into(),
            storage_target_id: target,
            status,
            location: "Media".into(),
            location_status: LocationStatus::Robot,
            block_size: 1024,
            format: 103,
            used_capacity: 0,
            num_of_mounts: 0,
            create_date: Utc::now(),
            agent: "site-a".into(),
            tape_slot_id: None,
            tape_drive_id: None,
            last_changed_local: None,
            last_changed_external: None,
        }
    }

    fn object(ip: Uuid, medium: Uuid, class: MediumClass) -> StorageObject {
        StorageObject {
            id: Uuid::new_v4(),
            content_location_type: class,
            content_location_value: String::new(),
            container: false,
            ip_id: ip,
            storage_medium_id: medium,
            last_changed_local: None,
            last_changed_external: None,
        }
    }

    fn package(id: Uuid, policy: Uuid, active: bool) -> InformationPackage {
        InformationPackage {
            id,
            object_identifier: format!("ip-{}", id.simple()),
            active,
            policy_id: Some(policy),
            object_size: 0,
            message_digest: None,
            message_digest_algorithm: None,
            aic_identifier: None,
            container_format: ContainerFormat::Tar,
        }
    }

    /// One policy, an old disk method flagged Migrate and a new tape method
    /// with an enabled target, one active package placed on the old medium.
    fn fixture() -> Fixture {
        let policy_id = Uuid::new_v4();
        let old_method = Uuid::new_v4();
        let new_method = Uuid::new_v4();
        let old_target = Uuid::new_v4();
        let new_target = Uuid::new_v4();
        let old_medium = Uuid::new_v4();
        let ip = Uuid::new_v4();

        let snapshot = TopologySnapshot {
            policies: vec![StoragePolicy {
                id: policy_id,
                name: "default".into(),
                storage_methods: vec![old_method, new_method],
            }],
            methods: vec![
                method(old_method, "disk-old", MediumClass::Disk),
                method(new_method, "tape-new", MediumClass::Tape),
            ],
            targets: vec![
                target(old_target, "disk1", 200),
                target(new_target, "lto5", 305),
            ],
            relations: vec![
                relation(old_method, old_target, RelationStatus::Migrate),
                relation(old_method, new_target, RelationStatus::Enabled),
            ],
            media: vec![medium(old_medium, old_target, MediumStatus::Write)],
            objects: vec![object(ip, old_medium, MediumClass::Disk)],
            packages: vec![package(ip, policy_id, true)],
        };

        Fixture {
            snapshot,
            policy_id,
            old_method,
            new_method,
            old_target,
            new_target,
            old_medium,
            ip,
        }
    }

    #[test]
    fn medium_with_uncopied_object_is_migratable() {
        let f = fixture();
        let medium = f.snapshot.medium(f.old_medium).unwrap();
        assert!(f.snapshot.has_non_migrated_object(medium, false));
        assert!(f.snapshot.medium_migratable(medium));
        assert!(!f.snapshot.medium_deactivatable(medium, false));
    }

    #[test]
    fn copy_on_destination_makes_medium_deactivatable() {
        let mut f = fixture();
        let new_medium = medium(Uuid::new_v4(), f.new_target, MediumStatus::Write);
        f.snapshot
            .objects
            .push(object(f.ip, new_medium.id, MediumClass::Tape));
        f.snapshot.media.push(new_medium);

        let medium = f.snapshot.medium(f.old_medium).unwrap();
        assert!(!f.snapshot.has_non_migrated_object(medium, false));
        assert!(!f.snapshot.medium_migratable(medium));
        assert!(f.snapshot.medium_deactivatable(medium, false));
    }

    #[test]
    fn inactive_packages_skip_migration_unless_asked() {
        let mut f = fixture();
        f.snapshot.packages[0].active = false;

        let medium = f.snapshot.medium(f.old_medium).unwrap();
        assert!(!f.snapshot.has_non_migrated_object(medium, false));
        assert!(f.snapshot.has_non_migrated_object(medium, true));
        assert!(f.snapshot.medium_deactivatable(medium, false));
        assert!(!f.snapshot.medium_deactivatable(medium, true));
    }

    #[test]
    fn disabled_destination_blocks_migration() {
        let mut f = fixture();
        for relation in &mut f.snapshot.relations {
            if relation.status == RelationStatus::Enabled {
                relation.status = RelationStatus::Disabled;
            }
        }
        let medium = f.snapshot.medium(f.old_medium).unwrap();
        assert!(f.snapshot.has_non_migrated_object(medium, false));
        assert!(!f.snapshot.medium_migratable(medium));
    }

    #[test]
    fn missing_copy_in_sibling_method_makes_medium_migratable() {
        let mut f = fixture();
        // Old target no longer migrating, but the policy's second method has
        // its own enabled target with no copy of the package.
        f.snapshot.relations = vec![
            relation(f.old_method, f.old_target, RelationStatus::Enabled),
            relation(f.new_method, f.new_target, RelationStatus::Enabled),
        ];
        let medium = f.snapshot.medium(f.old_medium).unwrap();
        assert!(f.snapshot.missing_object_in_other_method(medium));
        assert!(f.snapshot.medium_migratable(medium));

        let new_medium = medium_copy(&f);
        f.snapshot
            .objects
            .push(object(f.ip, new_medium.id, MediumClass::Tape));
        f.snapshot.media.push(new_medium);
        let medium = f.snapshot.medium(f.old_medium).unwrap();
        assert!(!f.snapshot.missing_object_in_other_method(medium));
        assert!(!f.snapshot.medium_migratable(medium));
    }

    fn medium_copy(f: &Fixture) -> StorageMedium {
        medium(Uuid::new_v4(), f.new_target, MediumStatus::Write)
    }

    #[test]
    fn inactive_medium_is_never_migratable() {
        let mut f = fixture();
        f.snapshot.media[0].status = MediumStatus::Inactive;
        let medium = f.snapshot.medium(f.old_medium).unwrap();
        assert!(!f.snapshot.medium_migratable(medium));
        assert!(!f.snapshot.medium_deactivatable(medium, false));
    }

    #[test]
    fn methods_outside_the_policy_are_ignored() {
        let mut f = fixture();
        f.snapshot.relations = vec![
            relation(f.old_method, f.old_target, RelationStatus::Enabled),
            relation(f.new_method, f.new_target, RelationStatus::Enabled),
        ];
        let policy = f.snapshot.policies.iter_mut().find(|p| p.id == f.policy_id);
        policy.unwrap().storage_methods.retain(|m| *m == f.old_method);

        let medium = f.snapshot.medium(f.old_medium).unwrap();
        assert!(!f.snapshot.missing_object_in_other_method(medium));
    }

    #[test]
    fn fastest_readable_skips_failed_media() {
        let mut f = fixture();
        let tape_medium = medium(Uuid::new_v4(), f.new_target, MediumStatus::Full);
        let mut tape_object = object(f.ip, tape_medium.id, MediumClass::Tape);
        tape_object.content_location_value = "3".into();
        tape_object.container = true;
        f.snapshot.media.push(tape_medium);
        f.snapshot.objects.push(tape_object);

        // Disk placement wins while its medium is healthy.
        let fastest = f.snapshot.fastest_readable_object(f.ip).unwrap();
        assert_eq!(fastest.content_location_type, MediumClass::Disk);

        f.snapshot.media[0].status = MediumStatus::Fail;
        let fastest = f.snapshot.fastest_readable_object(f.ip).unwrap();
        assert_eq!(fastest.content_location_type, MediumClass::Tape);
    }

    #[test]
    fn object_on_a_collected_medium_is_not_readable() {
        let mut f = fixture();
        let placed = f.snapshot.objects[0].clone();
        assert!(f.snapshot.object_readable(&placed));

        f.snapshot.media[0].location_status = LocationStatus::Collected;
        assert!(!f.snapshot.object_readable(&placed));
        assert!(f.snapshot.fastest_readable_object(f.ip).is_none());
    }

    #[test]
    fn disabled_method_makes_its_placements_unreadable() {
        let mut f = fixture();
        let placed = f.snapshot.objects[0].clone();
        for method in &mut f.snapshot.methods {
            method.enabled = false;
        }
        assert!(!f.snapshot.object_readable(&placed));
    }

    #[test]
    fn disabled_relation_makes_its_placements_unreadable() {
        let mut f = fixture();
        let placed = f.snapshot.objects[0].clone();
        for relation in &mut f.snapshot.relations {
            relation.status = RelationStatus::Disabled;
        }
        assert!(!f.snapshot.object_readable(&placed));
        assert!(f.snapshot.fastest_readable_object(f.ip).is_none());
    }

    #[test]
    fn enabled_relation_is_the_write_destination() {
        let f = fixture();
        let relation = f.snapshot.enabled_relation(f.old_method).unwrap();
        assert_eq!(relation.storage_target_id, f.new_target);
        assert!(f.snapshot.enabled_relation(f.new_method).is_none());
    }
}
