//! Topology resolution: which target a method writes to and which medium a
//! target writes on.

use std::sync::Arc;

use uuid::Uuid;

use arkiv_core::models::{MethodTargetRelation, StorageMedium, StorageTarget};
use arkiv_core::{Result, StorageError};
use arkiv_db::StorageStore;

/// Write-side topology resolution. Holds the location label and agent
/// identifier stamped onto newly allocated media.
pub struct Topology {
    store: Arc<dyn StorageStore>,
    medium_location: String,
    agent: String,
}

impl Topology {
    pub fn new(store: Arc<dyn StorageStore>, medium_location: String, agent: String) -> Self {
        Topology {
            store,
            medium_location,
            agent,
        }
    }

    /// The relation and target a method currently writes through. Fails with
    /// `NoTargetAvailable` when the method has no enabled relation.
    pub async fn resolve_enabled_target(
        &self,
        method_id: Uuid,
    ) -> Result<(MethodTargetRelation, StorageTarget)> {
        let relation = self
            .store
            .enabled_relation(method_id)
            .await?
            .ok_or(StorageError::NoTargetAvailable { method_id })?;
        let target = self
            .store
            .storage_target(relation.storage_target_id)
            .await?
            .ok_or_else(|| {
                StorageError::not_found("storage target", relation.storage_target_id)
            })?;
        Ok((relation, target))
    }

    /// The medium the target currently writes to, allocated on first demand.
    pub async fn write_medium(&self, target: &StorageTarget) -> Result<StorageMedium> {
        self.store
            .get_or_create_write_medium(target, &self.medium_location, &self.agent)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_target_error_names_the_method() {
        let method_id = Uuid::new_v4();
        let err = StorageError::NoTargetAvailable { method_id };
        assert!(err.to_string().contains(&method_id.to_string()));
    }
}
