//! Partition operations.

use idm_core::EventType;
use idm_model::{Partition, PartitionKind};
use idm_storage::{Region, StorageError, StorageResult, WriteBatch};
use uuid::Uuid;

use crate::manager::IdentityManager;
use crate::view::StoreView;

impl IdentityManager {
    /// Creates a realm or tier.
    ///
    /// ## Errors
    ///
    /// Returns `DuplicatePartition` if a partition of the same kind has the
    /// name, `NotFound` for an unknown parent, and a validation error for an
    /// invalid partition or a parent that is not a tier.
    pub async fn create_partition(&self, partition: Partition) -> StorageResult<Partition> {
        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        self.insert_partition(&mut view, partition).await
    }

    pub(crate) async fn insert_partition(
        &self,
        view: &mut StoreView<'_>,
        mut partition: Partition,
    ) -> StorageResult<Partition> {
        partition.validate()?;
        if view.find_partition(partition.kind, &partition.name).await?.is_some() {
            return Err(StorageError::DuplicatePartition {
                partition_type: partition.kind.as_str(),
                name: partition.name,
            });
        }
        if let Some(parent_id) = partition.parent_id {
            let parent = view
                .partition(parent_id)
                .await?
                .ok_or_else(|| StorageError::not_found("Tier", parent_id))?;
            if parent.is_realm() {
                return Err(StorageError::validation(format!(
                    "parent '{}' of tier '{}' is not a tier",
                    parent.name, partition.name
                )));
            }
        }

        let id = Uuid::now_v7();
        partition.id = Some(id);
        let record = view.registry().dematerialize(&partition)?;
        let mut batch = WriteBatch::new();
        batch.put(Region::Partitions, record).init_partition(id);
        self.commit(batch).await?;

        tracing::info!(partition = %id, name = %partition.name, kind = partition.kind.as_str(), "partition created");
        self.raise(EventType::PartitionCreated, Some(id), Some(id), None);
        Ok(partition)
    }

    /// Returns the realm with this name.
    ///
    /// ## Errors
    ///
    /// Returns `NotFoundByName` if no realm has the name.
    pub async fn get_realm(&self, name: &str) -> StorageResult<Partition> {
        self.snapshot_view().await?
            .find_partition(PartitionKind::Realm, name)
            .await?
            .ok_or_else(|| StorageError::not_found_by_name("Realm", name))
    }

    /// Returns the tier with this name.
    ///
    /// ## Errors
    ///
    /// Returns `NotFoundByName` if no tier has the name.
    pub async fn get_tier(&self, name: &str) -> StorageResult<Partition> {
        self.snapshot_view().await?
            .find_partition(PartitionKind::Tier, name)
            .await?
            .ok_or_else(|| StorageError::not_found_by_name("Tier", name))
    }

    /// Returns the partition with this id.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if no partition has the id.
    pub async fn get_partition(&self, id: Uuid) -> StorageResult<Partition> {
        self.snapshot_view().await?
            .partition(id)
            .await?
            .ok_or_else(|| StorageError::not_found("Partition", id))
    }

    /// Lists every partition.
    ///
    /// ## Errors
    ///
    /// Returns an error if the partition region cannot be read.
    pub async fn list_partitions(&self) -> StorageResult<Vec<Partition>> {
        Ok(self.snapshot_view().await?.partitions().await?.as_ref().clone())
    }

    /// Returns the default realm, creating it on first use.
    ///
    /// ## Errors
    ///
    /// Returns an error if the realm cannot be loaded or created.
    pub async fn default_realm(&self) -> StorageResult<Partition> {
        let cached = self.default_realm.read().clone();
        if let Some(realm) = cached {
            return Ok(realm);
        }
        let guard = self.lock().await;
        let cached = self.default_realm.read().clone();
        if let Some(realm) = cached {
            return Ok(realm);
        }
        let mut view = self.locked_view(&guard);
        let realm = match view
            .find_partition(PartitionKind::Realm, &self.default_realm_name)
            .await?
        {
            Some(realm) => realm,
            None => {
                tracing::info!(name = %self.default_realm_name, "creating default realm");
                self.insert_partition(&mut view, Partition::realm(self.default_realm_name.clone()))
                    .await?
            }
        };
        *self.default_realm.write() = Some(realm.clone());
        Ok(realm)
    }

    /// Removes an empty partition and its storage.
    ///
    /// Child tiers are detached and become top-level tiers.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` for an unknown partition and `PartitionNotEmpty`
    /// if it still owns agents, roles, or groups.
    pub async fn remove_partition(&self, partition: &Partition) -> StorageResult<()> {
        let id = partition
            .id
            .ok_or_else(|| StorageError::validation("partition has no id"))?;
        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        let stored = view
            .partition(id)
            .await?
            .ok_or_else(|| StorageError::not_found("Partition", id))?;

        for region in Region::identity_regions(id) {
            if !view.identities(region).await?.is_empty() {
                return Err(StorageError::PartitionNotEmpty { name: stored.name });
            }
        }

        let mut batch = WriteBatch::new();
        for child in view.partitions().await?.iter() {
            if child.parent_id == Some(id) {
                let mut detached = child.clone();
                detached.parent_id = None;
                batch.put(Region::Partitions, view.registry().dematerialize(&detached)?);
            }
        }
        batch.delete(Region::Partitions, id).drop_partition(id);
        self.commit(batch).await?;

        {
            let mut cached = self.default_realm.write();
            if cached.as_ref().and_then(|p| p.id) == Some(id) {
                *cached = None;
            }
        }
        tracing::info!(partition = %id, name = %stored.name, "partition removed");
        self.raise(EventType::PartitionDeleted, Some(id), Some(id), None);
        Ok(())
    }
}
