//! Medium sealing.
//!
//! A medium transitions Write to Full once its capacity policy trips. Before
//! the status flips, a sample of its placements is read back and checksum
//! validated against the package records; a mismatch poisons the medium to
//! Fail so nothing further is written to it.

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use arkiv_core::models::{MediumStatus, StorageMedium, StorageObject, StorageTarget};
use arkiv_core::{Result, StorageError, Validator, ValidatorOptions};
use arkiv_db::StorageStore;
use arkiv_storage::{PlacementDriver, ReadRequest};

/// The placements to read back before sealing: first, middle and last by
/// on-medium position when there are more than three, otherwise all of them.
pub fn verification_sample(objects: &[StorageObject]) -> Vec<&StorageObject> {
    if objects.len() <= 3 {
        return objects.iter().collect();
    }
    let middle = objects.len() / 2;
    vec![&objects[0], &objects[middle], &objects[objects.len() - 1]]
}

pub struct MediumSealer {
    store: Arc<dyn StorageStore>,
    driver: Arc<dyn PlacementDriver>,
    validator: Arc<dyn Validator>,
    verify_root: PathBuf,
}

impl MediumSealer {
    pub fn new(
        store: Arc<dyn StorageStore>,
        driver: Arc<dyn PlacementDriver>,
        validator: Arc<dyn Validator>,
        verify_root: PathBuf,
    ) -> Self {
        MediumSealer {
            store,
            driver,
            validator,
            verify_root,
        }
    }

    /// Verify a sample of the medium's placements and seal it as Full.
    /// A verification mismatch flips the medium to Fail instead and is
    /// returned to the caller. Tape media must be mounted.
    pub async fn mark_as_full(&self, medium_id: Uuid) -> Result<()> {
        let mut medium = self
            .store
            .storage_medium(medium_id)
            .await?
            .ok_or_else(|| StorageError::not_found("storage medium", medium_id))?;
        let target = self
            .store
            .storage_target(medium.storage_target_id)
            .await?
            .ok_or_else(|| StorageError::not_found("storage target", medium.storage_target_id))?;

        let objects = self.store.objects_on_medium(medium.id).await?;
        let sample: Vec<StorageObject> = verification_sample(&objects)
            .into_iter()
            .cloned()
            .collect();
        tracing::info!(
            medium = %medium.medium_id,
            placements = objects.len(),
            sample = sample.len(),
            "verifying before seal"
        );

        for object in &sample {
            if let Err(err) = self.verify_placement(&medium, &target, object).await {
                if matches!(err, StorageError::Verification { .. }) {
                    medium.status = MediumStatus::Fail;
                    medium.touch();
                    self.store.update_storage_medium(&medium).await?;
                    tracing::error!(medium = %medium.medium_id, error = %err, "seal verification failed");
                }
                return Err(err);
            }
        }

        medium.status = MediumStatus::Full;
        medium.touch();
        self.store.update_storage_medium(&medium).await?;
        tracing::info!(medium = %medium.medium_id, "medium sealed");
        Ok(())
    }

    /// Seal every writeable medium whose used capacity has passed its
    /// target's maximum. Returns the sealed medium ids.
    pub async fn seal_overfull_media(&self) -> Result<Vec<Uuid>> {
        let snapshot = self.store.snapshot().await?;
        let mut sealed = Vec::new();
        for medium in &snapshot.media {
            let Some(target) = snapshot.target_of_medium(medium) else {
                continue;
            };
            if medium.status == MediumStatus::Write && medium.should_be_sealed(target) {
                self.mark_as_full(medium.id).await?;
                sealed.push(medium.id);
            }
        }
        Ok(sealed)
    }

    async fn verify_placement(
        &self,
        medium: &StorageMedium,
        target: &StorageTarget,
        object: &StorageObject,
    ) -> Result<()> {
        let package = self
            .store
            .information_package(object.ip_id)
            .await?
            .ok_or_else(|| StorageError::not_found("information package", object.ip_id))?;

        let drive_device = match target.class() {
            arkiv_core::MediumClass::Tape => {
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
                Some(drive.device)
            }
            _ => None,
        };

        let destination = self
            .verify_root
            .join(&medium.medium_id)
            .join(object.id.simple().to_string());
        tokio::fs::create_dir_all(&destination)
            .await
            .map_err(|err| StorageError::Other(err.into()))?;

        let artifact = self
            .driver
            .read(ReadRequest {
                object,
                package: &package,
                target,
                medium,
                drive_device: drive_device.as_deref(),
                destination: &destination,
                include_xml: false,
            })
            .await?;

        self.validator
            .validate(
                &artifact,
                &ValidatorOptions {
                    expected: package.message_digest.clone(),
                    algorithm: package.message_digest_algorithm.clone(),
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arkiv_core::models::MediumClass;
    use arkiv_storage::{DriverResult, WriteRequest};
    use arkiv_testkit::{fixtures, ChecksumValidator, MemoryStore};
    use async_trait::async_trait;
    use sha2::{Digest, Sha256};

    /// Driver double whose reads materialize a fixed payload.
    struct FixedPayloadDriver {
        payload: Vec<u8>,
    }

    #[async_trait]
    impl PlacementDriver for FixedPayloadDriver {
        async fn write(&self, _request: WriteRequest<'_>) -> DriverResult<String> {
            unreachable!("sealing never writes")
        }

        async fn read(&self, request: ReadRequest<'_>) -> DriverResult<std::path::PathBuf> {
            let artifact = request.destination.join(request.package.container_name());
            std::fs::write(&artifact, &self.payload)?;
            Ok(artifact)
        }

        fn class(&self) -> MediumClass {
            MediumClass::Disk
        }
    }

    fn object_at(ip_id: Uuid, medium_id: Uuid, position: i64) -> StorageObject {
        let mut object = fixtures::object(ip_id, medium_id);
        object.content_location_type = MediumClass::Tape;
        object.content_location_value = position.to_string();
        object.container = true;
        object
    }

    #[test]
    fn sample_takes_first_middle_and_last() {
        let medium_id = Uuid::new_v4();
        let objects: Vec<StorageObject> = (1..=7)
            .map(|pos| object_at(Uuid::new_v4(), medium_id, pos))
            .collect();
        let sample = verification_sample(&objects);
        let positions: Vec<i64> = sample.iter().map(|o| o.position()).collect();
        assert_eq!(positions, vec![1, 4, 7]);

        let few = &objects[..3];
        assert_eq!(verification_sample(few).len(), 3);
    }

    async fn seeded_sealer(
        payload: &[u8],
        digest: Option<String>,
    ) -> (MediumSealer, Arc<MemoryStore>, Uuid, tempfile::TempDir) {
        let store = Arc::new(MemoryStore::new());
        let target = fixtures::disk_target("disk1");
        let medium = fixtures::medium(&target);
        let policy = fixtures::policy("default", vec![]);
        let mut package = fixtures::package(policy.id);
        package.message_digest = digest;
        package.message_digest_algorithm = Some("SHA-256".into());
        let object = object_at(package.id, medium.id, 1);

        store.seed_policy(policy).await;
        store.seed_target(target).await;
        store.seed_medium(medium.clone()).await;
        store.seed_package(package).await;
        store.seed_object(object).await;

        let verify_root = tempfile::tempdir().unwrap();
        let sealer = MediumSealer::new(
            store.clone(),
            Arc::new(FixedPayloadDriver {
                payload: payload.to_vec(),
            }),
            Arc::new(ChecksumValidator),
            verify_root.path().to_path_buf(),
        );
        (sealer, store, medium.id, verify_root)
    }

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    #[tokio::test]
    async fn matching_digest_seals_the_medium() {
        let payload = b"archived content";
        let (sealer, store, medium_id, _root) =
            seeded_sealer(payload, Some(sha256_hex(payload))).await;

        sealer.mark_as_full(medium_id).await.unwrap();
        assert_eq!(store.media().await[0].status, MediumStatus::Full);
    }

    #[tokio::test]
    async fn digest_mismatch_poisons_the_medium() {
        let (sealer, store, medium_id, _root) =
            seeded_sealer(b"archived content", Some(sha256_hex(b"other content"))).await;

        let err = sealer.mark_as_full(medium_id).await.unwrap_err();
        assert!(matches!(err, StorageError::Verification { .. }));
        assert_eq!(store.media().await[0].status, MediumStatus::Fail);
    }

    #[tokio::test]
    async fn unmounted_tape_cannot_be_sealed() {
        let store = Arc::new(MemoryStore::new());
        let target = fixtures::tape_target("lto5", "ST");
        let medium = fixtures::medium(&target);
        let package = fixtures::package(Uuid::new_v4());
        let object = object_at(package.id, medium.id, 1);
        store.seed_target(target).await;
        store.seed_medium(medium.clone()).await;
        store.seed_package(package).await;
        store.seed_object(object).await;

        let verify_root = tempfile::tempdir().unwrap();
        let sealer = MediumSealer::new(
            store.clone(),
            Arc::new(FixedPayloadDriver {
                payload: b"x".to_vec(),
            }),
            Arc::new(ChecksumValidator),
            verify_root.path().to_path_buf(),
        );

        let err = sealer.mark_as_full(medium.id).await.unwrap_err();
        assert!(matches!(err, StorageError::TapeNotMounted { .. }));
        assert_eq!(store.media().await[0].status, MediumStatus::Write);
    }
}
