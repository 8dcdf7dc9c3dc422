//! Read and write path for placements.
//!
//! Reading resolves where a placement's bytes actually come from: a direct
//! local read through the medium-class driver, a relay through the remote
//! site that owns the target, or serving a master site by repackaging and
//! uploading. Writing (ingest and migration) resolves the method's enabled
//! target, allocates the write medium on first demand, converts between
//! loose and containerized forms where source and destination disagree, and
//! records the new placement.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use arkiv_core::models::{
    InformationPackage, MediumClass, StorageMedium, StorageMethod, StorageObject, StorageTarget,
};
use arkiv_core::{Result, StorageConfig, StorageError};
use arkiv_db::StorageStore;
use arkiv_remote::SiteClient;
use arkiv_storage::{PlacementDriver, ReadRequest, WriteRequest};

use crate::packaging::{build_container, extract_container};
use crate::topology::Topology;

pub struct ReadWritePath {
    store: Arc<dyn StorageStore>,
    topology: Topology,
    drivers: Vec<Arc<dyn PlacementDriver>>,
    temp_root: PathBuf,
    verify_tls: bool,
}

impl ReadWritePath {
    pub fn new(
        store: Arc<dyn StorageStore>,
        drivers: Vec<Arc<dyn PlacementDriver>>,
        config: &StorageConfig,
    ) -> Self {
        let topology = Topology::new(
            store.clone(),
            config.medium_location.clone(),
            config.agent_identifier.clone(),
        );
        ReadWritePath {
            store,
            topology,
            drivers,
            temp_root: config.temp_root.clone(),
            verify_tls: config.verify_remote_tls,
        }
    }

    fn driver_for(&self, class: MediumClass) -> Result<&Arc<dyn PlacementDriver>> {
        self.drivers
            .iter()
            .find(|driver| driver.class() == class)
            .ok_or(StorageError::UnsupportedMediumClass { class })
    }

    /// Device node of the drive a tape medium is mounted in. Non-tape media
    /// need no device.
    async fn drive_device(
        &self,
        target: &StorageTarget,
        medium: &StorageMedium,
    ) -> Result<Option<String>> {
        if target.class() != MediumClass::Tape {
            return Ok(None);
        }
        let Some(drive_id) = medium.tape_drive_id else {
            return Err(StorageError::TapeNotMounted {
                medium_id: medium.medium_id.clone(),
            });
        };
        let drive = self
            .store
            .tape_drive(drive_id)
            .await?
            .ok_or_else(|| StorageError::not_found("tape drive", drive_id))?;
        Ok(Some(drive.device))
    }

    // --- reading ---

    /// Materialize a placement into `destination` and return the primary
    /// artifact: the container file, or the content directory.
    pub async fn read_placement(&self, object_id: Uuid, destination: &Path) -> Result<PathBuf> {
        let object = self
            .store
            .storage_object(object_id)
            .await?
            .ok_or_else(|| StorageError::not_found("storage object", object_id))?;
        let package = self
            .store
            .information_package(object.ip_id)
            .await?
            .ok_or_else(|| StorageError::not_found("information package", object.ip_id))?;
        let medium = self
            .store
            .storage_medium(object.storage_medium_id)
            .await?
            .ok_or_else(|| StorageError::not_found("storage medium", object.storage_medium_id))?;
        let target = self
            .store
            .storage_target(medium.storage_target_id)
            .await?
            .ok_or_else(|| StorageError::not_found("storage target", medium.storage_target_id))?;

        if target.has_remote_relay() {
            return self.read_via_relay(&object, &package, &target, destination).await;
        }
        if target.serves_master() {
            return self.serve_master(&object, &package, &medium, &target).await;
        }
        self.local_read(&object, &package, &medium, &target, destination, true)
            .await
    }

    async fn local_read(
        &self,
        object: &StorageObject,
        package: &InformationPackage,
        medium: &StorageMedium,
        target: &StorageTarget,
        destination: &Path,
        include_xml: bool,
    ) -> Result<PathBuf> {
        let driver = self.driver_for(target.class())?;
        let device = self.drive_device(target, medium).await?;
        let artifact = driver
            .read(ReadRequest {
                object,
                package,
                target,
                medium,
                drive_device: device.as_deref(),
                destination,
                include_xml,
            })
            .await?;
        Ok(artifact)
    }

    /// The target relays through another site: make sure the read job runs
    /// there and block until it is terminal. The remote site ships the bytes
    /// into `destination` as part of the job.
    async fn read_via_relay(
        &self,
        object: &StorageObject,
        package: &InformationPackage,
        target: &StorageTarget,
        destination: &Path,
    ) -> Result<PathBuf> {
        let connection = target.remote_server.as_deref().unwrap_or_default();
        let client = SiteClient::from_connection_string(connection, self.verify_tls)?;

        // One relay job per placement: the placement id doubles as the job
        // id, so a poller that died mid-read resumes the same job.
        let payload = serde_json::json!({
            "id": object.id,
            "name": "read_placement",
            "information_package": package.id,
            "params": { "storage_object": object.id },
        });
        let job_id = match client.get_job(object.id).await? {
            None => client.create_and_run_job(&payload).await?,
            Some(job) if job.status.is_failed() => {
                client.retry_job(job.id).await?;
                job.id
            }
            Some(job) => job.id,
        };
        client.wait_for_job(job_id).await?;
        tracing::info!(
            object = %object.id,
            host = %client.host(),
            "placement read relayed through remote site"
        );

        if object.container {
            Ok(destination.join(package.container_name()))
        } else {
            Ok(destination.to_path_buf())
        }
    }

    /// We are the remote site serving a master: read the bytes locally,
    /// repackage them into the form the master expects and upload every
    /// produced file.
    async fn serve_master(
        &self,
        object: &StorageObject,
        package: &InformationPackage,
        medium: &StorageMedium,
        target: &StorageTarget,
    ) -> Result<PathBuf> {
        let connection = target.master_server.as_deref().unwrap_or_default();
        let client = SiteClient::from_connection_string(connection, self.verify_tls)?;

        let staging = self
            .temp_root
            .join("serve")
            .join(object.id.simple().to_string());
        let uploads = if object.container {
            let destination = staging.clone();
            tokio::fs::create_dir_all(&destination)
                .await
                .map_err(|err| StorageError::Other(err.into()))?;
            let container = self
                .local_read(object, package, medium, target, &destination, true)
                .await?;
            let mut files = vec![container];
            for name in description_documents(package) {
                let path = destination.join(name);
                if tokio::fs::metadata(&path).await.is_ok() {
                    files.push(path);
                }
            }
            files
        } else {
            let content = staging.join(&package.object_identifier);
            self.local_read(object, package, medium, target, &content, false)
                .await?;
            build_container(&content, package, &staging.join("out")).await?
        };

        let upload_path = format!("/api/information-packages/{}/add-file/", package.id);
        for file in &uploads {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            client.upload_file(file, &upload_path, &name).await?;
        }
        tracing::info!(
            package = %package.object_identifier,
            host = %client.host(),
            files = uploads.len(),
            "served placement to master"
        );
        Ok(uploads[0].clone())
    }

    // --- writing ---

    /// Place prepared sources for a package under a storage method, creating
    /// the write medium on first demand. `sources` must already be in the
    /// method's form: a container with its description documents, or a
    /// single content tree. Returns the recorded placement, or `None` when
    /// the target's files were shipped to a remote site instead.
    pub async fn write_placement(
        &self,
        ip_id: Uuid,
        method_id: Uuid,
        sources: &[PathBuf],
    ) -> Result<Option<StorageObject>> {
        let package = self
            .store
            .information_package(ip_id)
            .await?
            .ok_or_else(|| StorageError::not_found("information package", ip_id))?;
        let method = self
            .store
            .storage_method(method_id)
            .await?
            .ok_or_else(|| StorageError::not_found("storage method", method_id))?;
        let (_, target) = self.topology.resolve_enabled_target(method_id).await?;
        self.persist(&package, &method, &target, sources).await
    }

    /// Copy a package to a storage method from its fastest readable
    /// placement, converting between loose and containerized forms when the
    /// source and the destination method disagree. Returns the recorded
    /// placement, or `None` when the files were shipped to a remote site.
    pub async fn migrate(&self, ip_id: Uuid, method_id: Uuid) -> Result<Option<StorageObject>> {
        let package = self
            .store
            .information_package(ip_id)
            .await?
            .ok_or_else(|| StorageError::not_found("information package", ip_id))?;
        let method = self
            .store
            .storage_method(method_id)
            .await?
            .ok_or_else(|| StorageError::not_found("storage method", method_id))?;
        let (_, target) = self.topology.resolve_enabled_target(method_id).await?;

        let snapshot = self.store.snapshot().await?;
        let source = snapshot
            .fastest_readable_object(ip_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("readable placement", ip_id))?;
        let source_medium = snapshot
            .medium(source.storage_medium_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("storage medium", source.storage_medium_id))?;
        let source_target = snapshot
            .target(source_medium.storage_target_id)
            .cloned()
            .ok_or_else(|| {
                StorageError::not_found("storage target", source_medium.storage_target_id)
            })?;

        let staging = self
            .temp_root
            .join("migrate")
            .join(source.id.simple().to_string());

        // Fetch the source into staging.
        let fetched = if source.container {
            let src_dir = staging.join("src");
            tokio::fs::create_dir_all(&src_dir)
                .await
                .map_err(|err| StorageError::Other(err.into()))?;
            if source_target.has_remote_relay() {
                self.read_via_relay(&source, &package, &source_target, &src_dir)
                    .await?
            } else {
                self.local_read(&source, &package, &source_medium, &source_target, &src_dir, true)
                    .await?
            }
        } else {
            let content = staging.join("src").join(&package.object_identifier);
            tokio::fs::create_dir_all(&content)
                .await
                .map_err(|err| StorageError::Other(err.into()))?;
            if source_target.has_remote_relay() {
                self.read_via_relay(&source, &package, &source_target, &content)
                    .await?;
            } else {
                self.local_read(&source, &package, &source_medium, &source_target, &content, false)
                    .await?;
            }
            content
        };

        // Convert where the destination's containerization disagrees.
        let sources: Vec<PathBuf> = match (source.container, method.containers) {
            (true, true) => {
                let mut files = vec![fetched.clone()];
                for name in description_documents(&package) {
                    let path = staging.join("src").join(name);
                    if tokio::fs::metadata(&path).await.is_ok() {
                        files.push(path);
                    }
                }
                files
            }
            (true, false) => {
                let content = extract_container(&fetched, &package, &staging.join("content")).await?;
                vec![content]
            }
            (false, true) => build_container(&fetched, &package, &staging.join("out")).await?,
            (false, false) => vec![fetched],
        };

        self.persist(&package, &method, &target, &sources).await
    }

    async fn persist(
        &self,
        package: &InformationPackage,
        method: &StorageMethod,
        target: &StorageTarget,
        sources: &[PathBuf],
    ) -> Result<Option<StorageObject>> {
        if target.has_remote_relay() {
            self.ship_to_remote(package, target, sources).await?;
            return Ok(None);
        }

        let mut medium = self.topology.write_medium(target).await?;
        let driver = self.driver_for(target.class())?;
        let device = self.drive_device(target, &medium).await?;
        let position = if target.class() == MediumClass::Tape {
            Some(self.next_tape_position(medium.id).await?)
        } else {
            None
        };

        let value = driver
            .write(WriteRequest {
                sources,
                target,
                medium: &medium,
                drive_device: device.as_deref(),
                position,
            })
            .await?;

        let object = StorageObject {
            id: Uuid::new_v4(),
            content_location_type: target.class(),
            content_location_value: value,
            container: method.containers,
            ip_id: package.id,
            storage_medium_id: medium.id,
            last_changed_local: Some(Utc::now()),
            last_changed_external: None,
        };
        self.store.insert_storage_object(&object).await?;

        medium.used_capacity += package.object_size;
        medium.touch();
        self.store.update_storage_medium(&medium).await?;

        tracing::info!(
            package = %package.object_identifier,
            target = %target.name,
            medium = %medium.medium_id,
            location = %object.content_location_value,
            "recorded placement"
        );
        Ok(Some(object))
    }

    /// The destination target lives on another site: ship the prepared files
    /// there instead of writing locally. The remote site records the
    /// placement; replication pulls it back.
    async fn ship_to_remote(
        &self,
        package: &InformationPackage,
        target: &StorageTarget,
        sources: &[PathBuf],
    ) -> Result<()> {
        let connection = target.remote_server.as_deref().unwrap_or_default();
        let client = SiteClient::from_connection_string(connection, self.verify_tls)?;
        let upload_path = format!("/api/information-packages/{}/add-file/", package.id);

        for source in sources {
            let metadata = tokio::fs::metadata(source)
                .await
                .map_err(|err| StorageError::Other(err.into()))?;
            if metadata.is_dir() {
                return Err(StorageError::Other(anyhow::anyhow!(
                    "cannot ship a loose content tree to a remote target: {}",
                    source.display()
                )));
            }
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            client.upload_file(source, &upload_path, &name).await?;
        }
        tracing::info!(
            package = %package.object_identifier,
            target = %target.name,
            host = %client.host(),
            files = sources.len(),
            "shipped placement to remote site"
        );
        Ok(())
    }

    /// Next free position on a tape: one past the highest recorded one.
    async fn next_tape_position(&self, medium_id: Uuid) -> Result<i64> {
        let objects = self.store.objects_on_medium(medium_id).await?;
        Ok(objects
            .iter()
            .map(|object| object.position())
            .max()
            .map_or(1, |highest| highest + 1))
    }
}

/// Description document names shipped next to a container.
fn description_documents(package: &InformationPackage) -> Vec<String> {
    let mut names = vec![package.package_xml_name()];
    if let Some(aic) = package.aic_xml_name() {
        names.push(aic);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use arkiv_core::models::{MediumStatus, RelationStatus};
    use arkiv_storage::{DiskDriver, TapeDriver};
    use arkiv_testkit::{fixtures, MemoryStore};

    struct Harness {
        store: Arc<MemoryStore>,
        path: ReadWritePath,
        _temp: tempfile::TempDir,
    }

    fn config(temp_root: &Path) -> StorageConfig {
        StorageConfig {
            database_url: "postgresql://unused/arkiv".into(),
            db_max_connections: 1,
            db_timeout_seconds: 1,
            medium_location: "Media".into(),
            agent_identifier: "site-a".into(),
            temp_root: temp_root.to_path_buf(),
            verify_root: temp_root.join("verify"),
            verify_remote_tls: true,
        }
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let temp = tempfile::tempdir().unwrap();
        let drivers: Vec<Arc<dyn PlacementDriver>> =
            vec![Arc::new(DiskDriver::new()), Arc::new(TapeDriver::new())];
        let path = ReadWritePath::new(store.clone(), drivers, &config(temp.path()));
        Harness {
            store,
            path,
            _temp: temp,
        }
    }

    fn disk_target_at(name: &str, root: &Path) -> arkiv_core::StorageTarget {
        let mut target = fixtures::disk_target(name);
        target.target = root.display().to_string();
        target
    }

    async fn seed_method(
        h: &Harness,
        name: &str,
        containers: bool,
        target: &arkiv_core::StorageTarget,
    ) -> Uuid {
        let mut method = fixtures::method(name, MediumClass::Disk);
        method.containers = containers;
        let method_id = method.id;
        h.store.seed_method(method).await;
        h.store.seed_target(target.clone()).await;
        h.store
            .seed_relation(fixtures::relation(method_id, target.id, RelationStatus::Enabled))
            .await;
        method_id
    }

    async fn seed_loose_content(root: &Path, identifier: &str) -> PathBuf {
        let content = root.join(identifier);
        tokio::fs::create_dir_all(content.join("data")).await.unwrap();
        tokio::fs::write(content.join("data/file.txt"), b"hello")
            .await
            .unwrap();
        content
    }

    #[tokio::test]
    async fn first_write_allocates_the_medium_and_records_the_placement() {
        let h = harness();
        let archive = tempfile::tempdir().unwrap();
        let target = disk_target_at("disk1", archive.path());
        let method_id = seed_method(&h, "disk", false, &target).await;

        let mut package = fixtures::package(Uuid::new_v4());
        package.object_size = 5;
        let ip_id = package.id;
        let identifier = package.object_identifier.clone();
        h.store.seed_package(package).await;

        let staging = tempfile::tempdir().unwrap();
        let content = seed_loose_content(staging.path(), &identifier).await;

        let object = h
            .path
            .write_placement(ip_id, method_id, &[content])
            .await
            .unwrap()
            .unwrap();

        assert!(!object.container);
        assert_eq!(object.content_location_type, MediumClass::Disk);
        assert_eq!(object.content_location_value, identifier);

        let media = h.store.media().await;
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].medium_id, "DISK_disk1");
        assert_eq!(media[0].status, MediumStatus::Write);
        assert_eq!(media[0].used_capacity, 5);
        assert!(archive.path().join(&identifier).join("data/file.txt").exists());
    }

    #[tokio::test]
    async fn reusing_the_open_medium_does_not_allocate_another() {
        let h = harness();
        let archive = tempfile::tempdir().unwrap();
        let target = disk_target_at("disk1", archive.path());
        let method_id = seed_method(&h, "disk", false, &target).await;

        let staging = tempfile::tempdir().unwrap();
        for _ in 0..2 {
            let package = fixtures::package(Uuid::new_v4());
            let identifier = package.object_identifier.clone();
            let ip_id = package.id;
            h.store.seed_package(package).await;
            let content = seed_loose_content(staging.path(), &identifier).await;
            h.path
                .write_placement(ip_id, method_id, &[content])
                .await
                .unwrap();
        }

        assert_eq!(h.store.media().await.len(), 1);
        assert_eq!(h.store.objects().await.len(), 2);
    }

    #[tokio::test]
    async fn migration_into_a_containerized_tier_builds_the_container() {
        let h = harness();
        let src_archive = tempfile::tempdir().unwrap();
        let dst_archive = tempfile::tempdir().unwrap();

        let src_target = disk_target_at("disk1", src_archive.path());
        let src_method = seed_method(&h, "disk", false, &src_target).await;
        let dst_target = disk_target_at("disk2", dst_archive.path());
        let dst_method = seed_method(&h, "disk-packed", true, &dst_target).await;

        let mut package = fixtures::package(Uuid::new_v4());
        package.aic_identifier = Some("aic-0001".into());
        let ip_id = package.id;
        let identifier = package.object_identifier.clone();
        h.store.seed_package(package).await;

        let staging = tempfile::tempdir().unwrap();
        let content = seed_loose_content(staging.path(), &identifier).await;
        h.path
            .write_placement(ip_id, src_method, &[content])
            .await
            .unwrap();

        let object = h.path.migrate(ip_id, dst_method).await.unwrap().unwrap();
        assert!(object.container);
        assert_eq!(object.content_location_value, format!("{}.tar", identifier));
        assert!(dst_archive.path().join(format!("{}.tar", identifier)).exists());
        assert!(dst_archive.path().join(format!("{}.xml", identifier)).exists());
        assert!(dst_archive.path().join("aic-0001.xml").exists());
        assert_eq!(h.store.media().await.len(), 2);
    }

    #[tokio::test]
    async fn migration_into_a_loose_tier_extracts_the_container() {
        let h = harness();
        let src_archive = tempfile::tempdir().unwrap();
        let dst_archive = tempfile::tempdir().unwrap();

        let src_target = disk_target_at("disk1", src_archive.path());
        let src_method = seed_method(&h, "disk-packed", true, &src_target).await;
        let dst_target = disk_target_at("disk2", dst_archive.path());
        let dst_method = seed_method(&h, "disk", false, &dst_target).await;

        let package = fixtures::package(Uuid::new_v4());
        let ip_id = package.id;
        let identifier = package.object_identifier.clone();
        h.store.seed_package(package.clone()).await;

        // Stage a real container and place it on the source tier.
        let staging = tempfile::tempdir().unwrap();
        let content = seed_loose_content(staging.path(), &identifier).await;
        let produced = build_container(&content, &package, &staging.path().join("out"))
            .await
            .unwrap();
        h.path
            .write_placement(ip_id, src_method, &produced)
            .await
            .unwrap();

        let object = h.path.migrate(ip_id, dst_method).await.unwrap().unwrap();
        assert!(!object.container);
        assert_eq!(object.content_location_value, identifier);
        assert!(dst_archive
            .path()
            .join(&identifier)
            .join("data/file.txt")
            .exists());
    }

    #[tokio::test]
    async fn local_read_materializes_the_placement() {
        let h = harness();
        let archive = tempfile::tempdir().unwrap();
        let target = disk_target_at("disk1", archive.path());
        let method_id = seed_method(&h, "disk", false, &target).await;

        let package = fixtures::package(Uuid::new_v4());
        let ip_id = package.id;
        let identifier = package.object_identifier.clone();
        h.store.seed_package(package).await;

        let staging = tempfile::tempdir().unwrap();
        let content = seed_loose_content(staging.path(), &identifier).await;
        let object = h
            .path
            .write_placement(ip_id, method_id, &[content])
            .await
            .unwrap()
            .unwrap();

        let out = tempfile::tempdir().unwrap();
        let artifact = h.path.read_placement(object.id, out.path()).await.unwrap();
        assert_eq!(artifact, out.path());
        assert_eq!(
            tokio::fs::read(out.path().join("data/file.txt")).await.unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn unmounted_tape_medium_cannot_be_written() {
        let h = harness();
        let target = fixtures::tape_target("lto5", "ST");
        let mut method = fixtures::method("tape", MediumClass::Tape);
        let method_id = method.id;
        method.containers = true;
        h.store.seed_method(method).await;
        h.store.seed_target(target.clone()).await;
        h.store
            .seed_relation(fixtures::relation(method_id, target.id, RelationStatus::Enabled))
            .await;
        h.store.seed_slot(fixtures::slot(1, "ST0001")).await;

        let package = fixtures::package(Uuid::new_v4());
        let ip_id = package.id;
        h.store.seed_package(package).await;

        let err = h
            .path
            .write_placement(ip_id, method_id, &[PathBuf::from("/nonexistent.tar")])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TapeNotMounted { .. }));
    }
}
