//! PostgreSQL implementation of the storage store.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres};
use uuid::Uuid;

use arkiv_core::models::{
    InformationPackage, IoQueueEntry, MediumClass, MethodTargetRelation, RelationStatus, Robot,
    RobotQueueEntry, StorageMedium, StorageMethod, StorageObject, StorageTarget, TapeDrive,
    TapeSlot, TopologySnapshot,
};
use arkiv_core::{Result, StorageConfig, StorageError};

use crate::db::rows::{
    DriveRow, IoQueueRow, MediumRow, MethodRow, ObjectRow, PackageRow, PolicyRow, RelationRow,
    RobotQueueRow, RobotRow, SlotRow, TargetRow,
};
use crate::db::store::{PullBatch, StorageStore};
use crate::db::transaction::TransactionGuard;

/// Create a connection pool from the application configuration.
pub async fn create_pool(config: &StorageConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    Ok(pool)
}

/// Run the embedded schema migrations.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(())
}

const MEDIUM_COLS: &str = "id, medium_id, storage_target_id, status, location, location_status, \
     block_size, format, used_capacity, num_of_mounts, create_date, agent, tape_slot_id, \
     tape_drive_id, last_changed_local, last_changed_external";

const OBJECT_COLS: &str = "id, content_location_type, content_location_value, container, ip_id, \
     storage_medium_id, last_changed_local, last_changed_external";

const DRIVE_COLS: &str = "id, drive_id, device, robot_id, status, io_queue_entry_id, \
     num_of_mounts, idle_time_secs, locked, last_change";

const ROBOT_QUEUE_COLS: &str = "id, req_type, status, posted, storage_medium_id, tape_drive_id, \
     robot_id, io_queue_entry_id";

const IO_QUEUE_COLS: &str = "id, req_type, req_purpose, object_path, write_size, result, status, \
     posted, ip_id, method_target_id, storage_medium_id, storage_object_id, remote_status, \
     transfer_task_id";

/// PostgreSQL-backed [`StorageStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl StorageStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn snapshot(&self) -> Result<TopologySnapshot> {
        let policies: Vec<PolicyRow> = sqlx::query_as::<Postgres, PolicyRow>(
            r#"
            SELECT p.id, p.name,
                   COALESCE(
                       array_agg(pm.storage_method_id)
                           FILTER (WHERE pm.storage_method_id IS NOT NULL),
                       '{}'
                   ) AS storage_methods
            FROM storage_policies p
            LEFT JOIN storage_policy_methods pm ON pm.policy_id = p.id
            GROUP BY p.id, p.name
            ORDER BY p.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let methods: Vec<MethodRow> = sqlx::query_as::<Postgres, MethodRow>(
            "SELECT id, name, enabled, class, remote, containers, cached \
             FROM storage_methods ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let targets: Vec<TargetRow> = sqlx::query_as::<Postgres, TargetRow>(
            "SELECT id, name, status, medium_type, default_block_size, default_format, \
             min_capacity_warning, max_capacity, remote_server, master_server, target \
             FROM storage_targets ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let relations: Vec<RelationRow> = sqlx::query_as::<Postgres, RelationRow>(
            "SELECT id, name, status, storage_method_id, storage_target_id \
             FROM method_target_relations ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let media: Vec<MediumRow> = sqlx::query_as::<Postgres, MediumRow>(&format!(
            "SELECT {} FROM storage_media ORDER BY create_date",
            MEDIUM_COLS
        ))
        .fetch_all(&self.pool)
        .await?;

        let objects: Vec<ObjectRow> = sqlx::query_as::<Postgres, ObjectRow>(&format!(
            "SELECT {} FROM storage_objects",
            OBJECT_COLS
        ))
        .fetch_all(&self.pool)
        .await?;

        let packages: Vec<PackageRow> = sqlx::query_as::<Postgres, PackageRow>(
            "SELECT id, object_identifier, active, policy_id, object_size, message_digest, \
             message_digest_algorithm, aic_identifier, container_format \
             FROM information_packages",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(TopologySnapshot {
            policies: policies.into_iter().map(PolicyRow::to_policy).collect(),
            methods: methods.into_iter().map(MethodRow::to_method).collect(),
            targets: targets.into_iter().map(TargetRow::to_target).collect(),
            relations: relations.into_iter().map(RelationRow::to_relation).collect(),
            media: media.into_iter().map(MediumRow::to_medium).collect(),
            objects: objects.into_iter().map(ObjectRow::to_object).collect(),
            packages: packages
                .into_iter()
                .map(PackageRow::to_package)
                .collect::<Result<Vec<_>>>()?,
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "storage_methods", db.record_id = %id))]
    async fn storage_method(&self, id: Uuid) -> Result<Option<StorageMethod>> {
        let row: Option<MethodRow> = sqlx::query_as::<Postgres, MethodRow>(
            "SELECT id, name, enabled, class, remote, containers, cached \
             FROM storage_methods WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MethodRow::to_method))
    }

    #[tracing::instrument(skip(self), fields(db.table = "storage_targets", db.record_id = %id))]
    async fn storage_target(&self, id: Uuid) -> Result<Option<StorageTarget>> {
        let row: Option<TargetRow> = sqlx::query_as::<Postgres, TargetRow>(
            "SELECT id, name, status, medium_type, default_block_size, default_format, \
             min_capacity_warning, max_capacity, remote_server, master_server, target \
             FROM storage_targets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TargetRow::to_target))
    }

    #[tracing::instrument(skip(self), fields(db.table = "method_target_relations"))]
    async fn enabled_relation(&self, method_id: Uuid) -> Result<Option<MethodTargetRelation>> {
        let row: Option<RelationRow> = sqlx::query_as::<Postgres, RelationRow>(
            "SELECT id, name, status, storage_method_id, storage_target_id \
             FROM method_target_relations \
             WHERE storage_method_id = $1 AND status = 1",
        )
        .bind(method_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RelationRow::to_relation))
    }

    #[tracing::instrument(skip(self), fields(db.table = "method_target_relations", db.record_id = %relation_id))]
    async fn set_relation_status(&self, relation_id: Uuid, status: RelationStatus) -> Result<()> {
        if status == RelationStatus::Enabled {
            let conflict: Option<(Uuid,)> = sqlx::query_as(
                "SELECT r2.id FROM method_target_relations r1 \
                 JOIN method_target_relations r2 \
                   ON r2.storage_method_id = r1.storage_method_id \
                  AND r2.id <> r1.id AND r2.status = 1 \
                 WHERE r1.id = $1",
            )
            .bind(relation_id)
            .fetch_optional(&self.pool)
            .await?;
            if conflict.is_some() {
                return Err(StorageError::Other(anyhow::anyhow!(
                    "Only one target can be enabled for a storage method at a time"
                )));
            }
        }
        sqlx::query("UPDATE method_target_relations SET status = $2 WHERE id = $1")
            .bind(relation_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "information_packages", db.record_id = %id))]
    async fn information_package(&self, id: Uuid) -> Result<Option<InformationPackage>> {
        let row: Option<PackageRow> = sqlx::query_as::<Postgres, PackageRow>(
            "SELECT id, object_identifier, active, policy_id, object_size, message_digest, \
             message_digest_algorithm, aic_identifier, container_format \
             FROM information_packages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PackageRow::to_package).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "storage_objects", db.record_id = %id))]
    async fn storage_object(&self, id: Uuid) -> Result<Option<StorageObject>> {
        let row: Option<ObjectRow> = sqlx::query_as::<Postgres, ObjectRow>(&format!(
            "SELECT {} FROM storage_objects WHERE id = $1",
            OBJECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ObjectRow::to_object))
    }

    #[tracing::instrument(skip(self), fields(db.table = "storage_objects"))]
    async fn objects_on_medium(&self, medium_id: Uuid) -> Result<Vec<StorageObject>> {
        let rows: Vec<ObjectRow> = sqlx::query_as::<Postgres, ObjectRow>(&format!(
            "SELECT {} FROM storage_objects WHERE storage_medium_id = $1 \
             ORDER BY CASE WHEN content_location_value ~ '^[0-9]+$' \
                           THEN content_location_value::bigint ELSE 0 END, \
                      content_location_value",
            OBJECT_COLS
        ))
        .bind(medium_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ObjectRow::to_object).collect())
    }

    #[tracing::instrument(skip(self, object), fields(db.table = "storage_objects", db.record_id = %object.id))]
    async fn insert_storage_object(&self, object: &StorageObject) -> Result<()> {
        sqlx::query(
            "INSERT INTO storage_objects (id, content_location_type, content_location_value, \
             container, ip_id, storage_medium_id, last_changed_local, last_changed_external) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(object.id)
        .bind(object.content_location_type)
        .bind(&object.content_location_value)
        .bind(object.container)
        .bind(object.ip_id)
        .bind(object.storage_medium_id)
        .bind(object.last_changed_local)
        .bind(object.last_changed_external)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "storage_media", db.record_id = %id))]
    async fn storage_medium(&self, id: Uuid) -> Result<Option<StorageMedium>> {
        let row: Option<MediumRow> = sqlx::query_as::<Postgres, MediumRow>(&format!(
            "SELECT {} FROM storage_media WHERE id = $1",
            MEDIUM_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MediumRow::to_medium))
    }

    #[tracing::instrument(skip(self), fields(db.table = "storage_media"))]
    async fn storage_medium_by_barcode(&self, barcode: &str) -> Result<Option<StorageMedium>> {
        let row: Option<MediumRow> = sqlx::query_as::<Postgres, MediumRow>(&format!(
            "SELECT {} FROM storage_media WHERE medium_id = $1",
            MEDIUM_COLS
        ))
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MediumRow::to_medium))
    }

    #[tracing::instrument(skip(self, target), fields(db.table = "storage_media", target = %target.name))]
    async fn get_or_create_write_medium(
        &self,
        target: &StorageTarget,
        location: &str,
        agent: &str,
    ) -> Result<StorageMedium> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        let existing: Option<MediumRow> = sqlx::query_as::<Postgres, MediumRow>(&format!(
            "SELECT {} FROM storage_media \
             WHERE storage_target_id = $1 AND status = 20 \
             ORDER BY create_date LIMIT 1",
            MEDIUM_COLS
        ))
        .bind(target.id)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = existing {
            tx.commit().await?;
            return Ok(row.to_medium());
        }

        let medium = match target.class() {
            MediumClass::Tape => {
                let slot: Option<SlotRow> = sqlx::query_as::<Postgres, SlotRow>(
                    "SELECT s.id, s.slot_id, s.medium_id, s.robot_id, s.status \
                     FROM tape_slots s \
                     WHERE s.status = 20 \
                       AND s.medium_id IS NOT NULL AND s.medium_id <> '' \
                       AND s.medium_id LIKE $1 || '%' \
                       AND NOT EXISTS ( \
                           SELECT 1 FROM storage_media m WHERE m.tape_slot_id = s.id \
                       ) \
                     ORDER BY s.slot_id LIMIT 1",
                )
                .bind(&target.target)
                .fetch_optional(&mut **tx)
                .await?;

                let Some(slot) = slot else {
                    tx.rollback().await?;
                    return Err(StorageError::NoMediumAvailable {
                        target: target.name.clone(),
                    });
                };
                StorageMedium::new_on_tape(target, &slot.to_slot(), agent, location)
            }
            MediumClass::Disk => StorageMedium::new_on_disk(target, agent, location),
            MediumClass::Cas => {
                tx.rollback().await?;
                return Err(StorageError::UnsupportedMediumClass {
                    class: MediumClass::Cas,
                });
            }
        };

        sqlx::query(
            "INSERT INTO storage_media (id, medium_id, storage_target_id, status, location, \
             location_status, block_size, format, used_capacity, num_of_mounts, create_date, \
             agent, tape_slot_id, tape_drive_id, last_changed_local, last_changed_external) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(medium.id)
        .bind(&medium.medium_id)
        .bind(medium.storage_target_id)
        .bind(medium.status)
        .bind(&medium.location)
        .bind(medium.location_status)
        .bind(medium.block_size)
        .bind(medium.format)
        .bind(medium.used_capacity)
        .bind(medium.num_of_mounts)
        .bind(medium.create_date)
        .bind(&medium.agent)
        .bind(medium.tape_slot_id)
        .bind(medium.tape_drive_id)
        .bind(medium.last_changed_local)
        .bind(medium.last_changed_external)
        .execute(&mut **tx)
        .await?;

        tx.commit().await?;
        tracing::info!(medium = %medium.medium_id, "allocated new storage medium");
        Ok(medium)
    }

    #[tracing::instrument(skip(self, medium), fields(db.table = "storage_media", db.record_id = %medium.id))]
    async fn update_storage_medium(&self, medium: &StorageMedium) -> Result<()> {
        sqlx::query(
            "UPDATE storage_media SET medium_id = $2, storage_target_id = $3, status = $4, \
             location = $5, location_status = $6, block_size = $7, format = $8, \
             used_capacity = $9, num_of_mounts = $10, agent = $11, tape_slot_id = $12, \
             tape_drive_id = $13, last_changed_local = $14, last_changed_external = $15 \
             WHERE id = $1",
        )
        .bind(medium.id)
        .bind(&medium.medium_id)
        .bind(medium.storage_target_id)
        .bind(medium.status)
        .bind(&medium.location)
        .bind(medium.location_status)
        .bind(medium.block_size)
        .bind(medium.format)
        .bind(medium.used_capacity)
        .bind(medium.num_of_mounts)
        .bind(&medium.agent)
        .bind(medium.tape_slot_id)
        .bind(medium.tape_drive_id)
        .bind(medium.last_changed_local)
        .bind(medium.last_changed_external)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "storage_media"))]
    async fn mounted_medium_of_drive(&self, drive_id: Uuid) -> Result<Option<StorageMedium>> {
        let row: Option<MediumRow> = sqlx::query_as::<Postgres, MediumRow>(&format!(
            "SELECT {} FROM storage_media WHERE tape_drive_id = $1",
            MEDIUM_COLS
        ))
        .bind(drive_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MediumRow::to_medium))
    }

    #[tracing::instrument(skip(self), fields(db.table = "robots", db.record_id = %id))]
    async fn robot(&self, id: Uuid) -> Result<Option<Robot>> {
        let row: Option<RobotRow> = sqlx::query_as::<Postgres, RobotRow>(
            "SELECT id, label, device, online FROM robots WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RobotRow::to_robot))
    }

    #[tracing::instrument(skip(self), fields(db.table = "tape_drives", db.record_id = %id))]
    async fn tape_drive(&self, id: Uuid) -> Result<Option<TapeDrive>> {
        let row: Option<DriveRow> = sqlx::query_as::<Postgres, DriveRow>(&format!(
            "SELECT {} FROM tape_drives WHERE id = $1",
            DRIVE_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(DriveRow::to_drive))
    }

    #[tracing::instrument(skip(self), fields(db.table = "tape_slots", db.record_id = %id))]
    async fn tape_slot(&self, id: Uuid) -> Result<Option<TapeSlot>> {
        let row: Option<SlotRow> = sqlx::query_as::<Postgres, SlotRow>(
            "SELECT id, slot_id, medium_id, robot_id, status FROM tape_slots WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SlotRow::to_slot))
    }

    #[tracing::instrument(skip(self, drive), fields(db.table = "tape_drives", db.record_id = %drive.id))]
    async fn update_tape_drive(&self, drive: &TapeDrive) -> Result<()> {
        sqlx::query(
            "UPDATE tape_drives SET drive_id = $2, device = $3, robot_id = $4, status = $5, \
             io_queue_entry_id = $6, num_of_mounts = $7, idle_time_secs = $8, locked = $9, \
             last_change = $10 WHERE id = $1",
        )
        .bind(drive.id)
        .bind(drive.drive_id)
        .bind(&drive.device)
        .bind(drive.robot_id)
        .bind(drive.status)
        .bind(drive.io_queue_entry_id)
        .bind(drive.num_of_mounts)
        .bind(drive.idle_time_secs)
        .bind(drive.locked)
        .bind(drive.last_change)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "tape_drives"))]
    async fn free_tape_drive(&self) -> Result<Option<TapeDrive>> {
        let row: Option<DriveRow> = sqlx::query_as::<Postgres, DriveRow>(&format!(
            "SELECT {} FROM tape_drives d \
             WHERE d.status = 20 AND d.locked = FALSE AND d.io_queue_entry_id IS NULL \
               AND NOT EXISTS (SELECT 1 FROM storage_media m WHERE m.tape_drive_id = d.id) \
             ORDER BY d.num_of_mounts LIMIT 1",
            DRIVE_COLS
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(DriveRow::to_drive))
    }

    #[tracing::instrument(skip(self), fields(db.table = "robots"))]
    async fn free_robot(&self) -> Result<Option<Robot>> {
        let row: Option<RobotRow> = sqlx::query_as::<Postgres, RobotRow>(
            "SELECT r.id, r.label, r.device, r.online FROM robots r \
             WHERE NOT EXISTS (SELECT 1 FROM robot_queue q WHERE q.robot_id = r.id) \
             ORDER BY r.label LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RobotRow::to_robot))
    }

    #[tracing::instrument(skip(self), fields(db.table = "tape_drives"))]
    async fn idle_mounted_drives(&self, now: DateTime<Utc>) -> Result<Vec<TapeDrive>> {
        let rows: Vec<DriveRow> = sqlx::query_as::<Postgres, DriveRow>(&format!(
            "SELECT {} FROM tape_drives d \
             WHERE d.status = 20 AND d.locked = FALSE \
               AND EXISTS (SELECT 1 FROM storage_media m WHERE m.tape_drive_id = d.id) \
               AND d.last_change <= $1 - make_interval(secs => d.idle_time_secs::double precision)",
            DRIVE_COLS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DriveRow::to_drive).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "storage_media", db.record_id = %medium_id))]
    async fn complete_mount(&self, medium_id: Uuid, drive_id: Uuid) -> Result<()> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;
        sqlx::query(
            "UPDATE storage_media SET tape_drive_id = $2, num_of_mounts = num_of_mounts + 1, \
             last_changed_local = now() WHERE id = $1",
        )
        .bind(medium_id)
        .bind(drive_id)
        .execute(&mut **tx)
        .await?;
        sqlx::query(
            "UPDATE tape_drives SET num_of_mounts = num_of_mounts + 1, last_change = now() \
             WHERE id = $1",
        )
        .bind(drive_id)
        .execute(&mut **tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "storage_media", db.record_id = %medium_id))]
    async fn complete_unmount(&self, medium_id: Uuid) -> Result<()> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;
        sqlx::query(
            "UPDATE tape_drives SET locked = FALSE, io_queue_entry_id = NULL, last_change = now() \
             WHERE id = (SELECT tape_drive_id FROM storage_media WHERE id = $1)",
        )
        .bind(medium_id)
        .execute(&mut **tx)
        .await?;
        sqlx::query(
            "UPDATE storage_media SET tape_drive_id = NULL, last_changed_local = now() \
             WHERE id = $1",
        )
        .bind(medium_id)
        .execute(&mut **tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, entry), fields(db.table = "robot_queue", db.record_id = %entry.id))]
    async fn insert_robot_queue_entry(&self, entry: &RobotQueueEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO robot_queue (id, req_type, status, posted, storage_medium_id, \
             tape_drive_id, robot_id, io_queue_entry_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(entry.req_type)
        .bind(entry.status)
        .bind(entry.posted)
        .bind(entry.storage_medium_id)
        .bind(entry.tape_drive_id)
        .bind(entry.robot_id)
        .bind(entry.io_queue_entry_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, entry), fields(db.table = "robot_queue", db.record_id = %entry.id))]
    async fn update_robot_queue_entry(&self, entry: &RobotQueueEntry) -> Result<()> {
        sqlx::query(
            "UPDATE robot_queue SET req_type = $2, status = $3, storage_medium_id = $4, \
             tape_drive_id = $5, robot_id = $6, io_queue_entry_id = $7 WHERE id = $1",
        )
        .bind(entry.id)
        .bind(entry.req_type)
        .bind(entry.status)
        .bind(entry.storage_medium_id)
        .bind(entry.tape_drive_id)
        .bind(entry.robot_id)
        .bind(entry.io_queue_entry_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "robot_queue", db.record_id = %id))]
    async fn delete_robot_queue_entry(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM robot_queue WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "robot_queue"))]
    async fn pending_forced_unmounts(&self) -> Result<Vec<RobotQueueEntry>> {
        let rows: Vec<RobotQueueRow> = sqlx::query_as::<Postgres, RobotQueueRow>(&format!(
            "SELECT {} FROM robot_queue \
             WHERE status IN (0, 2) AND req_type = 30 \
             ORDER BY status DESC, posted",
            ROBOT_QUEUE_COLS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RobotQueueRow::to_entry).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "robot_queue"))]
    async fn pending_robot_entries(&self, limit: i64) -> Result<Vec<RobotQueueEntry>> {
        let rows: Vec<RobotQueueRow> = sqlx::query_as::<Postgres, RobotQueueRow>(&format!(
            "SELECT {} FROM robot_queue \
             WHERE status IN (0, 2) AND req_type <> 30 \
             ORDER BY status DESC, req_type DESC, posted \
             LIMIT $1",
            ROBOT_QUEUE_COLS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RobotQueueRow::to_entry).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "robot_queue"))]
    async fn has_pending_unmount(&self, medium_id: Uuid) -> Result<bool> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM robot_queue \
             WHERE storage_medium_id = $1 AND req_type IN (20, 30) AND status IN (0, 2) \
             LIMIT 1",
        )
        .bind(medium_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    #[tracing::instrument(skip(self), fields(db.table = "io_queue", db.record_id = %id))]
    async fn io_queue_entry(&self, id: Uuid) -> Result<Option<IoQueueEntry>> {
        let row: Option<IoQueueRow> = sqlx::query_as::<Postgres, IoQueueRow>(&format!(
            "SELECT {} FROM io_queue WHERE id = $1",
            IO_QUEUE_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(IoQueueRow::to_entry))
    }

    #[tracing::instrument(skip(self, entry), fields(db.table = "io_queue", db.record_id = %entry.id))]
    async fn insert_io_queue_entry(&self, entry: &IoQueueEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO io_queue (id, req_type, req_purpose, object_path, write_size, result, \
             status, posted, ip_id, method_target_id, storage_medium_id, storage_object_id, \
             remote_status, transfer_task_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(entry.id)
        .bind(entry.req_type)
        .bind(&entry.req_purpose)
        .bind(&entry.object_path)
        .bind(entry.write_size)
        .bind(&entry.result)
        .bind(entry.status)
        .bind(entry.posted)
        .bind(entry.ip_id)
        .bind(entry.method_target_id)
        .bind(entry.storage_medium_id)
        .bind(entry.storage_object_id)
        .bind(entry.remote_status)
        .bind(&entry.transfer_task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, entry), fields(db.table = "io_queue", db.record_id = %entry.id))]
    async fn update_io_queue_entry(&self, entry: &IoQueueEntry) -> Result<()> {
        sqlx::query(
            "UPDATE io_queue SET req_type = $2, req_purpose = $3, object_path = $4, \
             write_size = $5, result = $6, status = $7, ip_id = $8, method_target_id = $9, \
             storage_medium_id = $10, storage_object_id = $11, remote_status = $12, \
             transfer_task_id = $13 WHERE id = $1",
        )
        .bind(entry.id)
        .bind(entry.req_type)
        .bind(&entry.req_purpose)
        .bind(&entry.object_path)
        .bind(entry.write_size)
        .bind(&entry.result)
        .bind(entry.status)
        .bind(entry.ip_id)
        .bind(entry.method_target_id)
        .bind(entry.storage_medium_id)
        .bind(entry.storage_object_id)
        .bind(entry.remote_status)
        .bind(&entry.transfer_task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, batch))]
    async fn apply_pull(&self, batch: &PullBatch) -> Result<()> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;
        for robot in &batch.robots {
            upsert_robot(&mut **tx, robot).await?;
        }
        for slot in &batch.tape_slots {
            upsert_tape_slot(&mut **tx, slot).await?;
        }
        for drive in &batch.tape_drives {
            upsert_tape_drive(&mut **tx, drive).await?;
        }
        for medium in &batch.media {
            upsert_storage_medium(&mut **tx, medium).await?;
        }
        for object in &batch.objects {
            upsert_storage_object(&mut **tx, object).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn upsert_robot(conn: &mut PgConnection, robot: &Robot) -> Result<()> {
    sqlx::query(
        "INSERT INTO robots (id, label, device, online) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (id) DO UPDATE SET label = EXCLUDED.label, device = EXCLUDED.device, \
         online = EXCLUDED.online",
    )
    .bind(robot.id)
    .bind(&robot.label)
    .bind(&robot.device)
    .bind(robot.online)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_tape_drive(conn: &mut PgConnection, drive: &TapeDrive) -> Result<()> {
    sqlx::query(
        "INSERT INTO tape_drives (id, drive_id, device, robot_id, status, io_queue_entry_id, \
         num_of_mounts, idle_time_secs, locked, last_change) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (id) DO UPDATE SET drive_id = EXCLUDED.drive_id, \
         device = EXCLUDED.device, robot_id = EXCLUDED.robot_id, status = EXCLUDED.status, \
         io_queue_entry_id = EXCLUDED.io_queue_entry_id, \
         num_of_mounts = EXCLUDED.num_of_mounts, idle_time_secs = EXCLUDED.idle_time_secs, \
         locked = EXCLUDED.locked, last_change = EXCLUDED.last_change",
    )
    .bind(drive.id)
    .bind(drive.drive_id)
    .bind(&drive.device)
    .bind(drive.robot_id)
    .bind(drive.status)
    .bind(drive.io_queue_entry_id)
    .bind(drive.num_of_mounts)
    .bind(drive.idle_time_secs)
    .bind(drive.locked)
    .bind(drive.last_change)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_tape_slot(conn: &mut PgConnection, slot: &TapeSlot) -> Result<()> {
    sqlx::query(
        "INSERT INTO tape_slots (id, slot_id, medium_id, robot_id, status) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (id) DO UPDATE SET slot_id = EXCLUDED.slot_id, \
         medium_id = EXCLUDED.medium_id, robot_id = EXCLUDED.robot_id, \
         status = EXCLUDED.status",
    )
    .bind(slot.id)
    .bind(slot.slot_id)
    .bind(&slot.medium_id)
    .bind(slot.robot_id)
    .bind(slot.status)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_storage_medium(conn: &mut PgConnection, medium: &StorageMedium) -> Result<()> {
    sqlx::query(
        "INSERT INTO storage_media (id, medium_id, storage_target_id, status, location, \
         location_status, block_size, format, used_capacity, num_of_mounts, create_date, \
         agent, tape_slot_id, tape_drive_id, last_changed_local, last_changed_external) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
         ON CONFLICT (id) DO UPDATE SET medium_id = EXCLUDED.medium_id, \
         storage_target_id = EXCLUDED.storage_target_id, status = EXCLUDED.status, \
         location = EXCLUDED.location, location_status = EXCLUDED.location_status, \
         block_size = EXCLUDED.block_size, format = EXCLUDED.format, \
         used_capacity = EXCLUDED.used_capacity, num_of_mounts = EXCLUDED.num_of_mounts, \
         create_date = EXCLUDED.create_date, agent = EXCLUDED.agent, \
         tape_slot_id = EXCLUDED.tape_slot_id, tape_drive_id = EXCLUDED.tape_drive_id, \
         last_changed_local = EXCLUDED.last_changed_local, \
         last_changed_external = EXCLUDED.last_changed_external",
    )
    .bind(medium.id)
    .bind(&medium.medium_id)
    .bind(medium.storage_target_id)
    .bind(medium.status)
    .bind(&medium.location)
    .bind(medium.location_status)
    .bind(medium.block_size)
    .bind(medium.format)
    .bind(medium.used_capacity)
    .bind(medium.num_of_mounts)
    .bind(medium.create_date)
    .bind(&medium.agent)
    .bind(medium.tape_slot_id)
    .bind(medium.tape_drive_id)
    .bind(medium.last_changed_local)
    .bind(medium.last_changed_external)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_storage_object(conn: &mut PgConnection, object: &StorageObject) -> Result<()> {
    sqlx::query(
        "INSERT INTO storage_objects (id, content_location_type, content_location_value, \
         container, ip_id, storage_medium_id, last_changed_local, last_changed_external) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (id) DO UPDATE SET \
         content_location_type = EXCLUDED.content_location_type, \
         content_location_value = EXCLUDED.content_location_value, \
         container = EXCLUDED.container, ip_id = EXCLUDED.ip_id, \
         storage_medium_id = EXCLUDED.storage_medium_id, \
         last_changed_local = EXCLUDED.last_changed_local, \
         last_changed_external = EXCLUDED.last_changed_external",
    )
    .bind(object.id)
    .bind(object.content_location_type)
    .bind(&object.content_location_value)
    .bind(object.container)
    .bind(object.ip_id)
    .bind(object.storage_medium_id)
    .bind(object.last_changed_local)
    .bind(object.last_changed_external)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
