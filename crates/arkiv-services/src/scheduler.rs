//! Tape robot scheduler.
//!
//! Drains the robot queue and turns entries into physical mount and unmount
//! jobs. All mutual exclusion lives in persisted state: a drive is taken by
//! binding a medium to it, an I/O entry holds a drive through the drive's
//! `io_queue_entry_id`, and a robot is busy while any queue entry references
//! it. The poller never holds in-process locks across awaits, so several
//! pollers can run against the same database.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use arkiv_core::constants::ROBOT_POLL_BATCH;
use arkiv_core::models::{QueueStatus, RobotQueueEntry, RobotReqType, TapeDrive};
use arkiv_core::{Result, StorageError};
use arkiv_db::StorageStore;
use arkiv_jobs::{JobExecutor, JobRequest, MountTapeParams, UnmountTapeParams};

/// Outcome counts of one poll run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub processed: usize,
    pub succeeded: usize,
    /// Entries left in the queue because a drive or robot was busy.
    pub skipped: usize,
    pub failed: usize,
}

pub struct TapeRobotScheduler {
    store: Arc<dyn StorageStore>,
    executor: Arc<dyn JobExecutor>,
}

impl TapeRobotScheduler {
    pub fn new(store: Arc<dyn StorageStore>, executor: Arc<dyn JobExecutor>) -> Self {
        TapeRobotScheduler { store, executor }
    }

    /// One scheduling pass: forced unmounts first, then a bounded batch of
    /// regular entries with unmounts ahead of mounts. Entries that cannot
    /// run yet stay queued for the next pass; entries that fail keep their
    /// Fail status in the queue for inspection.
    pub async fn poll(&self) -> Result<PollReport> {
        let mut entries = self.store.pending_forced_unmounts().await?;
        entries.extend(
            self.store
                .pending_robot_entries(ROBOT_POLL_BATCH as i64)
                .await?,
        );

        let mut report = PollReport::default();
        for entry in entries {
            report.processed += 1;
            let entry_id = entry.id;
            let req_type = entry.req_type;
            let outcome = match req_type {
                RobotReqType::Mount => self.process_mount(entry).await,
                RobotReqType::Unmount | RobotReqType::ForcedUnmount => {
                    self.process_unmount(entry).await
                }
            };
            match outcome {
                Ok(true) => report.succeeded += 1,
                Ok(false) => {
                    report.skipped += 1;
                    tracing::debug!(entry = %entry_id, %req_type, "no free hardware, entry deferred");
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(entry = %entry_id, %req_type, error = %err, "robot queue entry failed");
                }
            }
        }
        Ok(report)
    }

    /// Returns Ok(true) when the entry completed, Ok(false) when it was
    /// deferred for lack of free hardware.
    async fn process_mount(&self, mut entry: RobotQueueEntry) -> Result<bool> {
        let medium = self
            .store
            .storage_medium(entry.storage_medium_id)
            .await?
            .ok_or_else(|| StorageError::not_found("storage medium", entry.storage_medium_id))?;

        if let Some(drive_id) = medium.tape_drive_id {
            return self.resolve_mounted(entry, &medium.medium_id, drive_id).await;
        }

        let drive = match self.pick_drive(&entry).await? {
            Some(drive) => drive,
            None => return Ok(false),
        };
        let robot = match self.store.free_robot().await? {
            Some(robot) => robot,
            None => return Ok(false),
        };

        entry.status = QueueStatus::Progress;
        entry.robot_id = Some(robot.id);
        entry.tape_drive_id = Some(drive.id);
        self.store.update_robot_queue_entry(&entry).await?;

        let request = JobRequest::mount_tape(MountTapeParams {
            medium_id: medium.id,
            drive_id: drive.id,
        });
        match self.executor.execute(request).await {
            Ok(_) => {
                self.store.complete_mount(medium.id, drive.id).await?;
                if let Some(owner) = entry.io_queue_entry_id {
                    self.lock_drive(drive.id, owner).await?;
                }
                self.store.delete_robot_queue_entry(entry.id).await?;
                tracing::info!(medium = %medium.medium_id, drive = %drive.device, "tape mounted");
                Ok(true)
            }
            Err(err @ StorageError::TapeMounted { .. }) => {
                // The library already holds this tape in a drive the queue
                // did not know about. The entry is moot.
                self.store.delete_robot_queue_entry(entry.id).await?;
                Err(err)
            }
            Err(err) => {
                entry.status = QueueStatus::Fail;
                entry.robot_id = None;
                self.store.update_robot_queue_entry(&entry).await?;
                Err(err)
            }
        }
    }

    /// The requested tape is already in a drive. Settle the entry against
    /// the drive's current I/O owner.
    async fn resolve_mounted(
        &self,
        mut entry: RobotQueueEntry,
        medium_barcode: &str,
        drive_id: Uuid,
    ) -> Result<bool> {
        let drive = self
            .store
            .tape_drive(drive_id)
            .await?
            .ok_or_else(|| StorageError::not_found("tape drive", drive_id))?;

        match entry.io_queue_entry_id {
            Some(owner) if !drive.is_locked_by_other(owner) => {
                if drive.io_queue_entry_id.is_none() {
                    self.lock_drive(drive.id, owner).await?;
                }
                self.store.delete_robot_queue_entry(entry.id).await?;
                Ok(true)
            }
            Some(_) => {
                // Keep the entry ahead of fresh mounts until the holder
                // releases the drive.
                entry.status = QueueStatus::Initiate;
                self.store.update_robot_queue_entry(&entry).await?;
                Err(StorageError::TapeMountedAndLockedByOther {
                    medium_id: medium_barcode.to_string(),
                })
            }
            None => {
                entry.status = QueueStatus::Fail;
                self.store.update_robot_queue_entry(&entry).await?;
                Err(StorageError::TapeMounted {
                    medium_id: medium_barcode.to_string(),
                })
            }
        }
    }

    async fn process_unmount(&self, mut entry: RobotQueueEntry) -> Result<bool> {
        let medium = self
            .store
            .storage_medium(entry.storage_medium_id)
            .await?
            .ok_or_else(|| StorageError::not_found("storage medium", entry.storage_medium_id))?;

        let Some(drive_id) = medium.tape_drive_id else {
            self.store.delete_robot_queue_entry(entry.id).await?;
            return Err(StorageError::TapeUnmounted {
                medium_id: medium.medium_id,
            });
        };
        let drive = self
            .store
            .tape_drive(drive_id)
            .await?
            .ok_or_else(|| StorageError::not_found("tape drive", drive_id))?;

        if drive.locked && entry.req_type != RobotReqType::ForcedUnmount {
            entry.status = QueueStatus::Initiate;
            self.store.update_robot_queue_entry(&entry).await?;
            return Err(StorageError::TapeDriveLocked {
                device: drive.device,
            });
        }

        let robot = match self.store.free_robot().await? {
            Some(robot) => robot,
            None => return Ok(false),
        };

        entry.status = QueueStatus::Progress;
        entry.robot_id = Some(robot.id);
        self.store.update_robot_queue_entry(&entry).await?;

        let request = JobRequest::unmount_tape(UnmountTapeParams { drive_id: drive.id });
        match self.executor.execute(request).await {
            Ok(_) => {
                self.store.complete_unmount(medium.id).await?;
                self.store.delete_robot_queue_entry(entry.id).await?;
                tracing::info!(medium = %medium.medium_id, drive = %drive.device, "tape unmounted");
                Ok(true)
            }
            Err(err) => {
                entry.status = QueueStatus::Fail;
                entry.robot_id = None;
                self.store.update_robot_queue_entry(&entry).await?;
                Err(err)
            }
        }
    }

    /// The drive named by the entry, or the least-used free one. None when
    /// nothing is available right now.
    async fn pick_drive(&self, entry: &RobotQueueEntry) -> Result<Option<TapeDrive>> {
        let Some(drive_id) = entry.tape_drive_id else {
            return self.store.free_tape_drive().await;
        };
        let drive = self
            .store
            .tape_drive(drive_id)
            .await?
            .ok_or_else(|| StorageError::not_found("tape drive", drive_id))?;
        let occupied = self.store.mounted_medium_of_drive(drive.id).await?.is_some();
        if occupied || drive.locked || drive.io_queue_entry_id.is_some() {
            return Ok(None);
        }
        Ok(Some(drive))
    }

    async fn lock_drive(&self, drive_id: Uuid, owner: Uuid) -> Result<()> {
        let mut drive = self
            .store
            .tape_drive(drive_id)
            .await?
            .ok_or_else(|| StorageError::not_found("tape drive", drive_id))?;
        drive.io_queue_entry_id = Some(owner);
        drive.locked = true;
        self.store.update_tape_drive(&drive).await
    }

    /// Queue unmounts for drives whose tape has sat idle past the drive's
    /// idle time. Media with an unmount already queued are left alone.
    /// Returns how many unmounts were queued.
    pub async fn unmount_idle_drives(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut queued = 0;
        for drive in self.store.idle_mounted_drives(now).await? {
            let Some(medium) = self.store.mounted_medium_of_drive(drive.id).await? else {
                continue;
            };
            if self.store.has_pending_unmount(medium.id).await? {
                continue;
            }
            tracing::info!(medium = %medium.medium_id, drive = %drive.device, "queueing idle unmount");
            self.store
                .insert_robot_queue_entry(&RobotQueueEntry::unmount(medium.id, false))
                .await?;
            queued += 1;
        }
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arkiv_jobs::JobName;
    use arkiv_testkit::{fixtures, MemoryStore, RecordingExecutor};
    use chrono::Duration;

    struct Harness {
        store: Arc<MemoryStore>,
        executor: Arc<RecordingExecutor>,
        scheduler: TapeRobotScheduler,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(RecordingExecutor::new());
        let scheduler = TapeRobotScheduler::new(store.clone(), executor.clone());
        Harness {
            store,
            executor,
            scheduler,
        }
    }

    async fn seed_library(h: &Harness) -> (arkiv_core::TapeDrive, arkiv_core::StorageMedium) {
        let target = fixtures::tape_target("lto5", "ST");
        let medium = fixtures::medium(&target);
        let drive = fixtures::drive(0, "/dev/nst0");
        h.store.seed_target(target).await;
        h.store.seed_medium(medium.clone()).await;
        h.store.seed_drive(drive.clone()).await;
        h.store.seed_robot(fixtures::robot("robot0")).await;
        (drive, medium)
    }

    #[tokio::test]
    async fn mount_binds_medium_and_clears_the_entry() {
        let h = harness();
        let (drive, medium) = seed_library(&h).await;
        h.store
            .insert_robot_queue_entry(&RobotQueueEntry::mount(medium.id, None, None))
            .await
            .unwrap();

        let report = h.scheduler.poll().await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);

        let executed = h.executor.executed().await;
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].name, JobName::MountTape);

        assert!(h.store.robot_queue().await.is_empty());
        let media = h.store.media().await;
        assert_eq!(media[0].tape_drive_id, Some(drive.id));
        assert_eq!(media[0].num_of_mounts, 1);
        let drives = h.store.drives().await;
        assert_eq!(drives[0].num_of_mounts, 1);
        assert!(!drives[0].locked);
    }

    #[tokio::test]
    async fn mount_for_an_io_entry_locks_the_drive() {
        let h = harness();
        let (drive, medium) = seed_library(&h).await;
        let owner = Uuid::new_v4();
        h.store
            .insert_robot_queue_entry(&RobotQueueEntry::mount(medium.id, None, Some(owner)))
            .await
            .unwrap();

        let report = h.scheduler.poll().await.unwrap();
        assert_eq!(report.succeeded, 1);

        let drives = h.store.drives().await;
        assert_eq!(drives[0].id, drive.id);
        assert!(drives[0].locked);
        assert_eq!(drives[0].io_queue_entry_id, Some(owner));
    }

    #[tokio::test]
    async fn mount_without_free_drive_is_deferred() {
        let h = harness();
        let target = fixtures::tape_target("lto5", "ST");
        let medium = fixtures::medium(&target);
        h.store.seed_target(target).await;
        h.store.seed_medium(medium.clone()).await;
        h.store.seed_robot(fixtures::robot("robot0")).await;
        h.store
            .insert_robot_queue_entry(&RobotQueueEntry::mount(medium.id, None, None))
            .await
            .unwrap();

        let report = h.scheduler.poll().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(h.executor.executed().await.is_empty());

        // Entry is untouched and picked up again next pass.
        let queue = h.store.robot_queue().await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].status, QueueStatus::Pending);
    }

    #[tokio::test]
    async fn mount_of_already_mounted_tape_for_same_owner_is_satisfied() {
        let h = harness();
        let target = fixtures::tape_target("lto5", "ST");
        let owner = Uuid::new_v4();
        let mut drive = fixtures::drive(0, "/dev/nst0");
        drive.locked = true;
        drive.io_queue_entry_id = Some(owner);
        let mut medium = fixtures::medium(&target);
        medium.tape_drive_id = Some(drive.id);
        h.store.seed_target(target).await;
        h.store.seed_drive(drive).await;
        h.store.seed_medium(medium.clone()).await;
        h.store.seed_robot(fixtures::robot("robot0")).await;
        h.store
            .insert_robot_queue_entry(&RobotQueueEntry::mount(medium.id, None, Some(owner)))
            .await
            .unwrap();

        let report = h.scheduler.poll().await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(h.executor.executed().await.is_empty());
        assert!(h.store.robot_queue().await.is_empty());
    }

    #[tokio::test]
    async fn mount_contending_with_another_owner_waits_initiated() {
        let h = harness();
        let target = fixtures::tape_target("lto5", "ST");
        let mut drive = fixtures::drive(0, "/dev/nst0");
        drive.locked = true;
        drive.io_queue_entry_id = Some(Uuid::new_v4());
        let mut medium = fixtures::medium(&target);
        medium.tape_drive_id = Some(drive.id);
        h.store.seed_target(target).await;
        h.store.seed_drive(drive).await;
        h.store.seed_medium(medium.clone()).await;
        h.store
            .insert_robot_queue_entry(&RobotQueueEntry::mount(
                medium.id,
                None,
                Some(Uuid::new_v4()),
            ))
            .await
            .unwrap();

        let report = h.scheduler.poll().await.unwrap();
        assert_eq!(report.failed, 1);
        let queue = h.store.robot_queue().await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].status, QueueStatus::Initiate);
    }

    #[tokio::test]
    async fn unmount_releases_drive_and_medium() {
        let h = harness();
        let target = fixtures::tape_target("lto5", "ST");
        let drive = fixtures::drive(0, "/dev/nst0");
        let mut medium = fixtures::medium(&target);
        medium.tape_drive_id = Some(drive.id);
        h.store.seed_target(target).await;
        h.store.seed_drive(drive).await;
        h.store.seed_medium(medium.clone()).await;
        h.store.seed_robot(fixtures::robot("robot0")).await;
        h.store
            .insert_robot_queue_entry(&RobotQueueEntry::unmount(medium.id, false))
            .await
            .unwrap();

        let report = h.scheduler.poll().await.unwrap();
        assert_eq!(report.succeeded, 1);
        let executed = h.executor.executed().await;
        assert_eq!(executed[0].name, JobName::UnmountTape);
        assert!(h.store.robot_queue().await.is_empty());
        assert!(h.store.media().await[0].tape_drive_id.is_none());
    }

    #[tokio::test]
    async fn locked_drive_blocks_plain_unmount_but_not_forced() {
        let h = harness();
        let target = fixtures::tape_target("lto5", "ST");
        let mut drive = fixtures::drive(0, "/dev/nst0");
        drive.locked = true;
        drive.io_queue_entry_id = Some(Uuid::new_v4());
        let mut medium = fixtures::medium(&target);
        medium.tape_drive_id = Some(drive.id);
        h.store.seed_target(target).await;
        h.store.seed_drive(drive).await;
        h.store.seed_medium(medium.clone()).await;
        h.store.seed_robot(fixtures::robot("robot0")).await;

        h.store
            .insert_robot_queue_entry(&RobotQueueEntry::unmount(medium.id, false))
            .await
            .unwrap();
        let report = h.scheduler.poll().await.unwrap();
        assert_eq!(report.failed, 1);
        let queue = h.store.robot_queue().await;
        assert_eq!(queue[0].status, QueueStatus::Initiate);
        assert!(h.executor.executed().await.is_empty());

        h.store.delete_robot_queue_entry(queue[0].id).await.unwrap();
        h.store
            .insert_robot_queue_entry(&RobotQueueEntry::unmount(medium.id, true))
            .await
            .unwrap();
        let report = h.scheduler.poll().await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(h.store.media().await[0].tape_drive_id.is_none());
    }

    #[tokio::test]
    async fn failed_mount_releases_the_robot_and_keeps_the_entry() {
        let h = harness();
        let (_, medium) = seed_library(&h).await;
        h.executor
            .push_result(Err(StorageError::Other(anyhow::anyhow!("mtx failed"))))
            .await;
        h.store
            .insert_robot_queue_entry(&RobotQueueEntry::mount(medium.id, None, None))
            .await
            .unwrap();

        let report = h.scheduler.poll().await.unwrap();
        assert_eq!(report.failed, 1);
        let queue = h.store.robot_queue().await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].status, QueueStatus::Fail);
        assert!(queue[0].robot_id.is_none());
        assert!(h.store.media().await[0].tape_drive_id.is_none());
    }

    #[tokio::test]
    async fn idle_sweep_queues_one_unmount_per_drive() {
        let h = harness();
        let target = fixtures::tape_target("lto5", "ST");
        let mut drive = fixtures::drive(0, "/dev/nst0");
        drive.last_change = Utc::now() - Duration::seconds(drive.idle_time_secs + 1);
        let mut medium = fixtures::medium(&target);
        medium.tape_drive_id = Some(drive.id);
        h.store.seed_target(target).await;
        h.store.seed_drive(drive).await;
        h.store.seed_medium(medium).await;

        assert_eq!(h.scheduler.unmount_idle_drives(Utc::now()).await.unwrap(), 1);
        let queue = h.store.robot_queue().await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].req_type, RobotReqType::Unmount);

        // A second sweep sees the queued unmount and adds nothing.
        assert_eq!(h.scheduler.unmount_idle_drives(Utc::now()).await.unwrap(), 0);
        assert_eq!(h.store.robot_queue().await.len(), 1);
    }
}
