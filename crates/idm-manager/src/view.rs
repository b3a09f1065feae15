//! Read access to materialized regions.
//!
//! A [`StoreView`] loads each region at most once and keeps the
//! materialized values for the rest of the operation. Writers build a fresh
//! view after taking the write lock, so every check in one mutation sees
//! the same committed state. Readers build their view on a backend
//! snapshot, so commits landing mid-operation stay invisible to them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use idm_model::{CredentialStorage, IdentityType, Partition, PartitionKind};
use idm_storage::{
    Backend, EntityRecord, Mapped, MappingRegistry, Region, StorageResult, StoreSnapshot,
    StoredRelationship,
};
use uuid::Uuid;

/// Where a view reads from.
pub(crate) enum Source<'a> {
    /// The backend itself; only valid while the write lock is held.
    Locked(&'a dyn Backend),
    /// A pinned snapshot.
    Snapshot(Arc<dyn StoreSnapshot>),
}

impl Source<'_> {
    async fn load(&self, region: Region) -> StorageResult<Vec<EntityRecord>> {
        match self {
            Self::Locked(backend) => backend.load(region).await,
            Self::Snapshot(snapshot) => snapshot.load(region).await,
        }
    }
}

/// Per-operation cache over a backend.
pub(crate) struct StoreView<'a> {
    source: Source<'a>,
    registry: &'a MappingRegistry,
    partitions: Option<Arc<Vec<Partition>>>,
    identities: HashMap<Region, Arc<Vec<IdentityType>>>,
    relationships: Option<Arc<Vec<StoredRelationship>>>,
    credentials: HashMap<Uuid, Arc<Vec<CredentialStorage>>>,
    index: Option<Arc<HashMap<Uuid, IdentityType>>>,
}

impl<'a> StoreView<'a> {
    pub(crate) fn new(source: Source<'a>, registry: &'a MappingRegistry) -> Self {
        Self {
            source,
            registry,
            partitions: None,
            identities: HashMap::new(),
            relationships: None,
            credentials: HashMap::new(),
            index: None,
        }
    }

    pub(crate) const fn registry(&self) -> &'a MappingRegistry {
        self.registry
    }

    async fn load<T: Mapped>(&self, region: Region) -> StorageResult<Vec<T>> {
        let records = self.source.load(region).await?;
        tracing::trace!(region = %region, records = records.len(), "region loaded");
        records
            .iter()
            .map(|record| self.registry.materialize(record))
            .collect()
    }

    // === Partitions ===

    pub(crate) async fn partitions(&mut self) -> StorageResult<Arc<Vec<Partition>>> {
        if let Some(partitions) = &self.partitions {
            return Ok(Arc::clone(partitions));
        }
        let partitions = Arc::new(self.load::<Partition>(Region::Partitions).await?);
        self.partitions = Some(Arc::clone(&partitions));
        Ok(partitions)
    }

    pub(crate) async fn partition(&mut self, id: Uuid) -> StorageResult<Option<Partition>> {
        let partitions = self.partitions().await?;
        Ok(partitions.iter().find(|p| p.id == Some(id)).cloned())
    }

    pub(crate) async fn find_partition(
        &mut self,
        kind: PartitionKind,
        name: &str,
    ) -> StorageResult<Option<Partition>> {
        let partitions = self.partitions().await?;
        Ok(partitions
            .iter()
            .find(|p| p.kind == kind && p.name == name)
            .cloned())
    }

    /// Returns `start` followed by its tier ancestors.
    pub(crate) async fn partition_chain(&mut self, start: Uuid) -> StorageResult<Vec<Uuid>> {
        let partitions = self.partitions().await?;
        let mut chain = vec![start];
        let mut current = start;
        while let Some(parent) = partitions
            .iter()
            .find(|p| p.id == Some(current))
            .and_then(|p| p.parent_id)
        {
            if chain.contains(&parent) {
                tracing::warn!(partition = %start, "cycle in tier parents");
                break;
            }
            chain.push(parent);
            current = parent;
        }
        Ok(chain)
    }

    // === Identities ===

    pub(crate) async fn identities(&mut self, region: Region) -> StorageResult<Arc<Vec<IdentityType>>> {
        if let Some(identities) = self.identities.get(&region) {
            return Ok(Arc::clone(identities));
        }
        let identities = Arc::new(self.load::<IdentityType>(region).await?);
        self.identities.insert(region, Arc::clone(&identities));
        Ok(identities)
    }

    /// Every identity of every partition, keyed by id.
    pub(crate) async fn index(&mut self) -> StorageResult<Arc<HashMap<Uuid, IdentityType>>> {
        if let Some(index) = &self.index {
            return Ok(Arc::clone(index));
        }
        let partitions = self.partitions().await?;
        let mut index = HashMap::new();
        for partition in partitions.iter().filter_map(|p| p.id) {
            for region in Region::identity_regions(partition) {
                for identity in self.identities(region).await?.iter() {
                    if let Some(id) = identity.id {
                        index.insert(id, identity.clone());
                    }
                }
            }
        }
        let index = Arc::new(index);
        self.index = Some(Arc::clone(&index));
        Ok(index)
    }

    pub(crate) async fn identity(&mut self, id: Uuid) -> StorageResult<Option<IdentityType>> {
        Ok(self.index().await?.get(&id).cloned())
    }

    pub(crate) async fn find_agent(
        &mut self,
        partition: Uuid,
        login_name: &str,
    ) -> StorageResult<Option<IdentityType>> {
        let agents = self.identities(Region::Agents(partition)).await?;
        Ok(agents
            .iter()
            .find(|a| a.login_name() == Some(login_name))
            .cloned())
    }

    /// Finds a role by name, walking the tier chain.
    pub(crate) async fn find_role(
        &mut self,
        partition: Uuid,
        name: &str,
    ) -> StorageResult<Option<IdentityType>> {
        for scope in self.partition_chain(partition).await? {
            let roles = self.identities(Region::Roles(scope)).await?;
            if let Some(role) = roles.iter().find(|r| r.name() == Some(name)) {
                return Ok(Some(role.clone()));
            }
        }
        Ok(None)
    }

    /// Finds a group by path (leading `/`) or name, walking the tier chain.
    pub(crate) async fn find_group(
        &mut self,
        partition: Uuid,
        path_or_name: &str,
    ) -> StorageResult<Option<IdentityType>> {
        let by_path = path_or_name.starts_with('/');
        for scope in self.partition_chain(partition).await? {
            let groups = self.identities(Region::Groups(scope)).await?;
            let found = groups.iter().find(|g| {
                g.as_group().is_some_and(|group| {
                    if by_path {
                        group.path == path_or_name
                    } else {
                        group.name == path_or_name
                    }
                })
            });
            if let Some(group) = found {
                return Ok(Some(group.clone()));
            }
        }
        Ok(None)
    }

    /// Returns `group` followed by its ancestors.
    pub(crate) async fn group_lineage(&mut self, group: Uuid) -> StorageResult<Vec<Uuid>> {
        let index = self.index().await?;
        let mut lineage = vec![group];
        let mut seen = HashSet::from([group]);
        let mut current = group;
        while let Some(parent) = index
            .get(&current)
            .and_then(IdentityType::as_group)
            .and_then(|g| g.parent_id)
        {
            if !seen.insert(parent) {
                break;
            }
            lineage.push(parent);
            current = parent;
        }
        Ok(lineage)
    }

    // === Relationships ===

    pub(crate) async fn relationships(&mut self) -> StorageResult<Arc<Vec<StoredRelationship>>> {
        if let Some(relationships) = &self.relationships {
            return Ok(Arc::clone(relationships));
        }
        let relationships = Arc::new(self.load::<StoredRelationship>(Region::Relationships).await?);
        self.relationships = Some(Arc::clone(&relationships));
        Ok(relationships)
    }

    // === Credentials ===

    pub(crate) async fn credentials(
        &mut self,
        partition: Uuid,
    ) -> StorageResult<Arc<Vec<CredentialStorage>>> {
        if let Some(credentials) = self.credentials.get(&partition) {
            return Ok(Arc::clone(credentials));
        }
        let credentials =
            Arc::new(self.load::<CredentialStorage>(Region::Credentials(partition)).await?);
        self.credentials.insert(partition, Arc::clone(&credentials));
        Ok(credentials)
    }
}
