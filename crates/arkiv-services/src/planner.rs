//! Migration planner.
//!
//! Determines which packages still need a copy under which storage methods
//! of their policy, as a pure set computation over a topology snapshot, and
//! submits one idempotent migration job per (package, method) pair.

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use arkiv_core::models::{RelationStatus, TopologySnapshot};
use arkiv_core::{MediumStatus, Result};
use arkiv_db::StorageStore;
use arkiv_jobs::{JobExecutor, JobRequest, MigrateStorageParams};

/// One package that needs a copy under one storage method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MigrationNeed {
    pub ip_id: Uuid,
    pub method_id: Uuid,
}

/// Whether `ip_id` still needs a copy under `method_id`.
///
/// True when the package sits on a target the method is migrating away from
/// without a copy on the method's enabled target yet, or when it has no copy
/// under the method at all.
fn needs_copy(snapshot: &TopologySnapshot, ip_id: Uuid, method_id: Uuid) -> bool {
    let on_status = |status: RelationStatus| {
        snapshot.package_objects(ip_id).any(|obj| {
            snapshot.medium(obj.storage_medium_id).is_some_and(|medium| {
                snapshot
                    .relations_of_target(medium.storage_target_id)
                    .any(|r| r.storage_method_id == method_id && r.status == status)
            })
        })
    };

    if on_status(RelationStatus::Enabled) {
        return false;
    }
    on_status(RelationStatus::Migrate) || !snapshot.package_has_object_in_method(ip_id, method_id)
}

/// Compute the migration set for one policy.
///
/// `methods` restricts planning to an explicit subset of the policy's
/// methods. Methods without an enabled write target are skipped; they have
/// nowhere to migrate to. The computation is read-only and idempotent
/// between state changes.
pub fn plan_policy(
    snapshot: &TopologySnapshot,
    policy_id: Uuid,
    methods: Option<&[Uuid]>,
    include_inactive: bool,
) -> Vec<MigrationNeed> {
    let Some(policy) = snapshot.policy(policy_id) else {
        return Vec::new();
    };

    let mut needs = Vec::new();
    for ip in snapshot
        .packages
        .iter()
        .filter(|ip| ip.policy_id == Some(policy_id) && (include_inactive || ip.active))
    {
        for &method_id in &policy.storage_methods {
            if methods.is_some_and(|subset| !subset.contains(&method_id)) {
                continue;
            }
            let Some(method) = snapshot.method(method_id) else {
                continue;
            };
            if !method.enabled || snapshot.enabled_relation(method_id).is_none() {
                continue;
            }
            if needs_copy(snapshot, ip.id, method_id) {
                needs.push(MigrationNeed {
                    ip_id: ip.id,
                    method_id,
                });
            }
        }
    }
    needs
}

/// Media whose content has been fully copied off a migrating target.
pub fn deactivatable_media(snapshot: &TopologySnapshot, include_inactive: bool) -> Vec<Uuid> {
    snapshot
        .media
        .iter()
        .filter(|medium| snapshot.medium_deactivatable(medium, include_inactive))
        .map(|medium| medium.id)
        .collect()
}

/// Plans migrations over the store and hands them to the job executor.
pub struct MigrationPlanner {
    store: Arc<dyn StorageStore>,
    executor: Arc<dyn JobExecutor>,
    temp_root: PathBuf,
}

impl MigrationPlanner {
    pub fn new(
        store: Arc<dyn StorageStore>,
        executor: Arc<dyn JobExecutor>,
        temp_root: PathBuf,
    ) -> Self {
        MigrationPlanner {
            store,
            executor,
            temp_root,
        }
    }

    pub async fn plan(
        &self,
        policy_id: Uuid,
        methods: Option<&[Uuid]>,
        include_inactive: bool,
    ) -> Result<Vec<MigrationNeed>> {
        let snapshot = self.store.snapshot().await?;
        Ok(plan_policy(&snapshot, policy_id, methods, include_inactive))
    }

    /// Submit one migration job per need. Submission dedupes on
    /// (job name, package) while an earlier job is still queued, so
    /// re-planning is harmless. Returns how many new jobs were created.
    pub async fn submit(&self, needs: &[MigrationNeed]) -> Result<usize> {
        let mut created = 0;
        for need in needs {
            let request = JobRequest::migrate_storage(
                need.ip_id,
                MigrateStorageParams {
                    storage_method_id: need.method_id,
                    temp_path: self.temp_root.display().to_string(),
                },
            );
            if self.executor.submit(request).await? {
                created += 1;
            }
        }
        tracing::info!(
            needs = needs.len(),
            created,
            "submitted migration jobs"
        );
        Ok(created)
    }

    /// Deactivate every medium whose migration chain is satisfied. Returns
    /// the deactivated medium ids.
    pub async fn deactivate_migrated_media(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<Uuid>> {
        let snapshot = self.store.snapshot().await?;
        let eligible = deactivatable_media(&snapshot, include_inactive);
        for &medium_id in &eligible {
            if let Some(mut medium) = self.store.storage_medium(medium_id).await? {
                medium.status = MediumStatus::Inactive;
                medium.touch();
                self.store.update_storage_medium(&medium).await?;
                tracing::info!(medium = %medium.medium_id, "deactivated migrated medium");
            }
        }
        Ok(eligible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arkiv_core::models::{
        ContainerFormat, InformationPackage, LocationStatus, MediumClass, MethodTargetRelation,
        StorageMedium, StorageMethod, StorageObject, StoragePolicy, StorageTarget,
    };
    use chrono::Utc;

    struct Fixture {
        snapshot: TopologySnapshot,
        policy: Uuid,
        disk_method: Uuid,
        tape_method: Uuid,
        disk_target: Uuid,
        tape_target: Uuid,
        disk_medium: Uuid,
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

    fn medium(id: Uuid, target: Uuid) -> StorageMedium {
        StorageMedium {
            id,
            medium_id: "ST0001".into(),
            storage_target_id: target,
            status: MediumStatus::Write,
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

    fn object(ip: Uuid, medium: Uuid) -> StorageObject {
        StorageObject {
            id: Uuid::new_v4(),
            content_location_type: MediumClass::Disk,
            content_location_value: String::new(),
            container: false,
            ip_id: ip,
            storage_medium_id: medium,
            last_changed_local: None,
            last_changed_external: None,
        }
    }

    fn package(id: Uuid, policy: Uuid) -> InformationPackage {
        InformationPackage {
            id,
            object_identifier: format!("ip-{}", id.simple()),
            active: true,
            policy_id: Some(policy),
            object_size: 0,
            message_digest: None,
            message_digest_algorithm: None,
            aic_identifier: None,
            container_format: ContainerFormat::Tar,
        }
    }

    /// One policy with a disk method (enabled on disk_target) and a tape
    /// method (enabled on tape_target); one package placed on disk only.
    fn fixture() -> Fixture {
        let policy = Uuid::new_v4();
        let disk_method = Uuid::new_v4();
        let tape_method = Uuid::new_v4();
        let disk_target = Uuid::new_v4();
        let tape_target = Uuid::new_v4();
        let disk_medium = Uuid::new_v4();
        let ip = Uuid::new_v4();

        let snapshot = TopologySnapshot {
            policies: vec![StoragePolicy {
                id: policy,
                name: "default".into(),
                storage_methods: vec![disk_method, tape_method],
            }],
            methods: vec![
                method(disk_method, "disk", MediumClass::Disk),
                method(tape_method, "tape", MediumClass::Tape),
            ],
            targets: vec![
                target(disk_target, "disk1", 200),
                target(tape_target, "lto5", 305),
            ],
            relations: vec![
                relation(disk_method, disk_target, RelationStatus::Enabled),
                relation(tape_method, tape_target, RelationStatus::Enabled),
            ],
            media: vec![medium(disk_medium, disk_target)],
            objects: vec![object(ip, disk_medium)],
            packages: vec![package(ip, policy)],
        };

        Fixture {
            snapshot,
            policy,
            disk_method,
            tape_method,
            disk_target,
            tape_target,
            disk_medium,
            ip,
        }
    }

    #[test]
    fn missing_sibling_copy_is_planned() {
        let f = fixture();
        let needs = plan_policy(&f.snapshot, f.policy, None, false);
        assert_eq!(
            needs,
            vec![MigrationNeed {
                ip_id: f.ip,
                method_id: f.tape_method
            }]
        );
    }

    #[test]
    fn planning_is_idempotent() {
        let f = fixture();
        let first = plan_policy(&f.snapshot, f.policy, None, false);
        let second = plan_policy(&f.snapshot, f.policy, None, false);
        assert_eq!(first, second);
    }

    #[test]
    fn satisfied_policy_plans_nothing() {
        let mut f = fixture();
        let tape_medium = medium(Uuid::new_v4(), f.tape_target);
        f.snapshot.objects.push(object(f.ip, tape_medium.id));
        f.snapshot.media.push(tape_medium);

        assert!(plan_policy(&f.snapshot, f.policy, None, false).is_empty());
    }

    #[test]
    fn migrate_flag_replans_within_the_method() {
        let mut f = fixture();
        // Tape tier satisfied; disk tier starts migrating to a new target.
        let tape_medium = medium(Uuid::new_v4(), f.tape_target);
        f.snapshot.objects.push(object(f.ip, tape_medium.id));
        f.snapshot.media.push(tape_medium);

        let new_target = Uuid::new_v4();
        f.snapshot.targets.push(target(new_target, "disk2", 200));
        for r in &mut f.snapshot.relations {
            if r.storage_method_id == f.disk_method {
                r.status = RelationStatus::Migrate;
            }
        }
        f.snapshot
            .relations
            .push(relation(f.disk_method, new_target, RelationStatus::Enabled));

        let needs = plan_policy(&f.snapshot, f.policy, None, false);
        assert_eq!(
            needs,
            vec![MigrationNeed {
                ip_id: f.ip,
                method_id: f.disk_method
            }]
        );

        // Once the copy lands on the new target the chain is quiet and the
        // old medium can go.
        let new_medium = medium(Uuid::new_v4(), new_target);
        f.snapshot.objects.push(object(f.ip, new_medium.id));
        f.snapshot.media.push(new_medium);
        assert!(plan_policy(&f.snapshot, f.policy, None, false).is_empty());
        assert_eq!(deactivatable_media(&f.snapshot, false), vec![f.disk_medium]);
    }

    #[test]
    fn methods_without_enabled_target_are_skipped() {
        let mut f = fixture();
        for r in &mut f.snapshot.relations {
            if r.storage_method_id == f.tape_method {
                r.status = RelationStatus::Disabled;
            }
        }
        assert!(plan_policy(&f.snapshot, f.policy, None, false).is_empty());
    }

    #[test]
    fn explicit_method_subset_narrows_the_plan() {
        let f = fixture();
        let subset = [f.disk_method];
        assert!(plan_policy(&f.snapshot, f.policy, Some(&subset), false).is_empty());
        let subset = [f.tape_method];
        assert_eq!(plan_policy(&f.snapshot, f.policy, Some(&subset), false).len(), 1);
    }

    #[test]
    fn inactive_packages_are_excluded_unless_requested() {
        let mut f = fixture();
        f.snapshot.packages[0].active = false;
        assert!(plan_policy(&f.snapshot, f.policy, None, false).is_empty());
        assert_eq!(plan_policy(&f.snapshot, f.policy, None, true).len(), 1);
    }

    #[test]
    fn medium_on_uncopied_migrating_target_is_not_deactivatable() {
        let mut f = fixture();
        for r in &mut f.snapshot.relations {
            if r.storage_method_id == f.disk_method {
                r.status = RelationStatus::Migrate;
            }
        }
        f.snapshot.targets.push(target(Uuid::new_v4(), "disk2", 200));
        assert!(deactivatable_media(&f.snapshot, false).is_empty());
    }
}
