//! In-memory [`StorageStore`] mirroring the PostgreSQL store's semantics.
//!
//! Every query and every side effect follows the production store, including
//! the orderings the pollers depend on, so service tests exercise the same
//! decision paths they would take against a real database.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use arkiv_core::models::{
    free_tape_slot, InformationPackage, IoQueueEntry, MediumClass, MethodTargetRelation,
    RelationStatus, Robot, RobotQueueEntry, RobotReqType, StorageMedium, StorageMethod,
    StorageObject, StoragePolicy, StorageTarget, TapeDrive, TapeSlot, TopologySnapshot,
};
use arkiv_core::{DeviceStatus, MediumStatus, Result, StorageError};
use arkiv_db::{PullBatch, StorageStore};

#[derive(Default)]
struct State {
    policies: Vec<StoragePolicy>,
    methods: Vec<StorageMethod>,
    targets: Vec<StorageTarget>,
    relations: Vec<MethodTargetRelation>,
    media: Vec<StorageMedium>,
    objects: Vec<StorageObject>,
    packages: Vec<InformationPackage>,
    robots: Vec<Robot>,
    drives: Vec<TapeDrive>,
    slots: Vec<TapeSlot>,
    robot_queue: Vec<RobotQueueEntry>,
    io_queue: Vec<IoQueueEntry>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the topology tables from a prebuilt snapshot.
    pub async fn load_snapshot(&self, snapshot: TopologySnapshot) {
        let mut state = self.state.lock().await;
        state.policies = snapshot.policies;
        state.methods = snapshot.methods;
        state.targets = snapshot.targets;
        state.relations = snapshot.relations;
        state.media = snapshot.media;
        state.objects = snapshot.objects;
        state.packages = snapshot.packages;
    }

    pub async fn seed_policy(&self, policy: StoragePolicy) {
        self.state.lock().await.policies.push(policy);
    }

    pub async fn seed_method(&self, method: StorageMethod) {
        self.state.lock().await.methods.push(method);
    }

    pub async fn seed_target(&self, target: StorageTarget) {
        self.state.lock().await.targets.push(target);
    }

    pub async fn seed_relation(&self, relation: MethodTargetRelation) {
        self.state.lock().await.relations.push(relation);
    }

    pub async fn seed_medium(&self, medium: StorageMedium) {
        self.state.lock().await.media.push(medium);
    }

    pub async fn seed_object(&self, object: StorageObject) {
        self.state.lock().await.objects.push(object);
    }

    pub async fn seed_package(&self, package: InformationPackage) {
        self.state.lock().await.packages.push(package);
    }

    pub async fn seed_robot(&self, robot: Robot) {
        self.state.lock().await.robots.push(robot);
    }

    pub async fn seed_drive(&self, drive: TapeDrive) {
        self.state.lock().await.drives.push(drive);
    }

    pub async fn seed_slot(&self, slot: TapeSlot) {
        self.state.lock().await.slots.push(slot);
    }

    /// Current robot queue contents, for assertions.
    pub async fn robot_queue(&self) -> Vec<RobotQueueEntry> {
        self.state.lock().await.robot_queue.clone()
    }

    pub async fn io_queue(&self) -> Vec<IoQueueEntry> {
        self.state.lock().await.io_queue.clone()
    }

    pub async fn media(&self) -> Vec<StorageMedium> {
        self.state.lock().await.media.clone()
    }

    pub async fn objects(&self) -> Vec<StorageObject> {
        self.state.lock().await.objects.clone()
    }

    pub async fn drives(&self) -> Vec<TapeDrive> {
        self.state.lock().await.drives.clone()
    }
}

#[async_trait::async_trait]
impl StorageStore for MemoryStore {
    async fn snapshot(&self) -> Result<TopologySnapshot> {
        let state = self.state.lock().await;
        let mut media = state.media.clone();
        media.sort_by_key(|m| m.create_date);
        Ok(TopologySnapshot {
            policies: state.policies.clone(),
            methods: state.methods.clone(),
            targets: state.targets.clone(),
            relations: state.relations.clone(),
            media,
            objects: state.objects.clone(),
            packages: state.packages.clone(),
        })
    }

    async fn storage_method(&self, id: Uuid) -> Result<Option<StorageMethod>> {
        let state = self.state.lock().await;
        Ok(state.methods.iter().find(|m| m.id == id).cloned())
    }

    async fn storage_target(&self, id: Uuid) -> Result<Option<StorageTarget>> {
        let state = self.state.lock().await;
        Ok(state.targets.iter().find(|t| t.id == id).cloned())
    }

    async fn enabled_relation(&self, method_id: Uuid) -> Result<Option<MethodTargetRelation>> {
        let state = self.state.lock().await;
        Ok(state
            .relations
            .iter()
            .find(|r| r.storage_method_id == method_id && r.status == RelationStatus::Enabled)
            .cloned())
    }

    async fn set_relation_status(&self, relation_id: Uuid, status: RelationStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        if status == RelationStatus::Enabled {
            let method_id = state
                .relations
                .iter()
                .find(|r| r.id == relation_id)
                .map(|r| r.storage_method_id);
            if let Some(method_id) = method_id {
                let conflict = state.relations.iter().any(|r| {
                    r.storage_method_id == method_id
                        && r.id != relation_id
                        && r.status == RelationStatus::Enabled
                });
                if conflict {
                    return Err(StorageError::Other(anyhow::anyhow!(
                        "Only one target can be enabled for a storage method at a time"
                    )));
                }
            }
        }
        if let Some(relation) = state.relations.iter_mut().find(|r| r.id == relation_id) {
            relation.status = status;
        }
        Ok(())
    }

    async fn information_package(&self, id: Uuid) -> Result<Option<InformationPackage>> {
        let state = self.state.lock().await;
        Ok(state.packages.iter().find(|p| p.id == id).cloned())
    }

    async fn storage_object(&self, id: Uuid) -> Result<Option<StorageObject>> {
        let state = self.state.lock().await;
        Ok(state.objects.iter().find(|o| o.id == id).cloned())
    }

    async fn objects_on_medium(&self, medium_id: Uuid) -> Result<Vec<StorageObject>> {
        let state = self.state.lock().await;
        let mut objects: Vec<StorageObject> = state
            .objects
            .iter()
            .filter(|o| o.storage_medium_id == medium_id)
            .cloned()
            .collect();
        objects.sort_by(|a, b| {
            let key = |o: &StorageObject| {
                (
                    o.content_location_value.parse::<i64>().unwrap_or(0),
                    o.content_location_value.clone(),
                )
            };
            key(a).cmp(&key(b))
        });
        Ok(objects)
    }

    async fn insert_storage_object(&self, object: &StorageObject) -> Result<()> {
        self.state.lock().await.objects.push(object.clone());
        Ok(())
    }

    async fn storage_medium(&self, id: Uuid) -> Result<Option<StorageMedium>> {
        let state = self.state.lock().await;
        Ok(state.media.iter().find(|m| m.id == id).cloned())
    }

    async fn storage_medium_by_barcode(&self, barcode: &str) -> Result<Option<StorageMedium>> {
        let state = self.state.lock().await;
        Ok(state.media.iter().find(|m| m.medium_id == barcode).cloned())
    }

    async fn get_or_create_write_medium(
        &self,
        target: &StorageTarget,
        location: &str,
        agent: &str,
    ) -> Result<StorageMedium> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state
            .media
            .iter()
            .filter(|m| m.storage_target_id == target.id && m.status == MediumStatus::Write)
            .min_by_key(|m| m.create_date)
        {
            return Ok(existing.clone());
        }

        let medium = match target.class() {
            MediumClass::Tape => {
                let slot = free_tape_slot(&state.slots, &state.media, &target.target)
                    .ok_or_else(|| StorageError::NoMediumAvailable {
                        target: target.name.clone(),
                    })?
                    .clone();
                StorageMedium::new_on_tape(target, &slot, agent, location)
            }
            MediumClass::Disk => StorageMedium::new_on_disk(target, agent, location),
            MediumClass::Cas => {
                return Err(StorageError::UnsupportedMediumClass {
                    class: MediumClass::Cas,
                })
            }
        };

        state.media.push(medium.clone());
        Ok(medium)
    }

    async fn update_storage_medium(&self, medium: &StorageMedium) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.media.iter_mut().find(|m| m.id == medium.id) {
            *existing = medium.clone();
        }
        Ok(())
    }

    async fn mounted_medium_of_drive(&self, drive_id: Uuid) -> Result<Option<StorageMedium>> {
        let state = self.state.lock().await;
        Ok(state
            .media
            .iter()
            .find(|m| m.tape_drive_id == Some(drive_id))
            .cloned())
    }

    async fn robot(&self, id: Uuid) -> Result<Option<Robot>> {
        let state = self.state.lock().await;
        Ok(state.robots.iter().find(|r| r.id == id).cloned())
    }

    async fn tape_drive(&self, id: Uuid) -> Result<Option<TapeDrive>> {
        let state = self.state.lock().await;
        Ok(state.drives.iter().find(|d| d.id == id).cloned())
    }

    async fn tape_slot(&self, id: Uuid) -> Result<Option<TapeSlot>> {
        let state = self.state.lock().await;
        Ok(state.slots.iter().find(|s| s.id == id).cloned())
    }

    async fn update_tape_drive(&self, drive: &TapeDrive) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.drives.iter_mut().find(|d| d.id == drive.id) {
            *existing = drive.clone();
        }
        Ok(())
    }

    async fn free_tape_drive(&self) -> Result<Option<TapeDrive>> {
        let state = self.state.lock().await;
        Ok(state
            .drives
            .iter()
            .filter(|d| {
                d.status == DeviceStatus::Write
                    && !d.locked
                    && d.io_queue_entry_id.is_none()
                    && !state.media.iter().any(|m| m.tape_drive_id == Some(d.id))
            })
            .min_by_key(|d| d.num_of_mounts)
            .cloned())
    }

    async fn free_robot(&self) -> Result<Option<Robot>> {
        let state = self.state.lock().await;
        Ok(state
            .robots
            .iter()
            .filter(|r| {
                !state
                    .robot_queue
                    .iter()
                    .any(|e| e.robot_id == Some(r.id))
            })
            .min_by(|a, b| a.label.cmp(&b.label))
            .cloned())
    }

    async fn idle_mounted_drives(&self, now: DateTime<Utc>) -> Result<Vec<TapeDrive>> {
        let state = self.state.lock().await;
        Ok(state
            .drives
            .iter()
            .filter(|d| {
                d.status == DeviceStatus::Write
                    && !d.locked
                    && state.media.iter().any(|m| m.tape_drive_id == Some(d.id))
                    && d.is_idle(now)
            })
            .cloned()
            .collect())
    }

    async fn complete_mount(&self, medium_id: Uuid, drive_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(medium) = state.media.iter_mut().find(|m| m.id == medium_id) {
            medium.tape_drive_id = Some(drive_id);
            medium.num_of_mounts += 1;
            medium.last_changed_local = Some(now);
        }
        if let Some(drive) = state.drives.iter_mut().find(|d| d.id == drive_id) {
            drive.num_of_mounts += 1;
            drive.last_change = now;
        }
        Ok(())
    }

    async fn complete_unmount(&self, medium_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let drive_id = state
            .media
            .iter()
            .find(|m| m.id == medium_id)
            .and_then(|m| m.tape_drive_id);
        if let Some(drive) = state.drives.iter_mut().find(|d| Some(d.id) == drive_id) {
            drive.locked = false;
            drive.io_queue_entry_id = None;
            drive.last_change = now;
        }
        if let Some(medium) = state.media.iter_mut().find(|m| m.id == medium_id) {
            medium.tape_drive_id = None;
            medium.last_changed_local = Some(now);
        }
        Ok(())
    }

    async fn insert_robot_queue_entry(&self, entry: &RobotQueueEntry) -> Result<()> {
        self.state.lock().await.robot_queue.push(entry.clone());
        Ok(())
    }

    async fn update_robot_queue_entry(&self, entry: &RobotQueueEntry) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.robot_queue.iter_mut().find(|e| e.id == entry.id) {
            *existing = entry.clone();
        }
        Ok(())
    }

    async fn delete_robot_queue_entry(&self, id: Uuid) -> Result<()> {
        self.state.lock().await.robot_queue.retain(|e| e.id != id);
        Ok(())
    }

    async fn pending_forced_unmounts(&self) -> Result<Vec<RobotQueueEntry>> {
        let state = self.state.lock().await;
        let mut entries: Vec<RobotQueueEntry> = state
            .robot_queue
            .iter()
            .filter(|e| {
                e.status.awaiting_processing() && e.req_type == RobotReqType::ForcedUnmount
            })
            .cloned()
            .collect();
        entries.sort_by_key(|e| (Reverse(e.status.as_i32()), e.posted));
        Ok(entries)
    }

    async fn pending_robot_entries(&self, limit: i64) -> Result<Vec<RobotQueueEntry>> {
        let state = self.state.lock().await;
        let mut entries: Vec<RobotQueueEntry> = state
            .robot_queue
            .iter()
            .filter(|e| {
                e.status.awaiting_processing() && e.req_type != RobotReqType::ForcedUnmount
            })
            .cloned()
            .collect();
        entries.sort_by_key(|e| {
            (
                Reverse(e.status.as_i32()),
                Reverse(e.req_type.as_i32()),
                e.posted,
            )
        });
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn has_pending_unmount(&self, medium_id: Uuid) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.robot_queue.iter().any(|e| {
            e.storage_medium_id == medium_id
                && matches!(
                    e.req_type,
                    RobotReqType::Unmount | RobotReqType::ForcedUnmount
                )
                && e.status.awaiting_processing()
        }))
    }

    async fn io_queue_entry(&self, id: Uuid) -> Result<Option<IoQueueEntry>> {
        let state = self.state.lock().await;
        Ok(state.io_queue.iter().find(|e| e.id == id).cloned())
    }

    async fn insert_io_queue_entry(&self, entry: &IoQueueEntry) -> Result<()> {
        self.state.lock().await.io_queue.push(entry.clone());
        Ok(())
    }

    async fn update_io_queue_entry(&self, entry: &IoQueueEntry) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.io_queue.iter_mut().find(|e| e.id == entry.id) {
            *existing = entry.clone();
        }
        Ok(())
    }

    // Validation runs before any mutation so a rejected batch leaves the
    // store untouched, matching the transactional PostgreSQL path.
    async fn apply_pull(&self, batch: &PullBatch) -> Result<()> {
        let mut state = self.state.lock().await;
        for medium in &batch.media {
            let taken = state
                .media
                .iter()
                .chain(batch.media.iter())
                .any(|m| m.medium_id == medium.medium_id && m.id != medium.id);
            if taken {
                return Err(StorageError::Other(anyhow::anyhow!(
                    "barcode {} already assigned to another medium",
                    medium.medium_id
                )));
            }
        }
        for robot in &batch.robots {
            upsert(&mut state.robots, robot, |r| r.id == robot.id);
        }
        for slot in &batch.tape_slots {
            upsert(&mut state.slots, slot, |s| s.id == slot.id);
        }
        for drive in &batch.tape_drives {
            upsert(&mut state.drives, drive, |d| d.id == drive.id);
        }
        for medium in &batch.media {
            upsert(&mut state.media, medium, |m| m.id == medium.id);
        }
        for object in &batch.objects {
            upsert(&mut state.objects, object, |o| o.id == object.id);
        }
        Ok(())
    }
}

fn upsert<T: Clone>(items: &mut Vec<T>, item: &T, same: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|x| same(x)) {
        Some(existing) => *existing = item.clone(),
        None => items.push(item.clone()),
    }
}
