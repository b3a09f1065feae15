//! Storage backend contract.
//!
//! Backends persist opaque [`EntityRecord`]s grouped into regions. A region
//! holds every record of a fixed set of types for one partition (or for the
//! whole store, for partitions and relationships). The engine reads whole
//! regions and writes through atomic batches.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::mapping::{EntityRecord, TypeKey};

/// A group of records stored and loaded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
    /// Every realm and tier.
    Partitions,
    /// Every relationship, across partitions.
    Relationships,
    /// Agents and users of one partition.
    Agents(Uuid),
    /// Roles of one partition.
    Roles(Uuid),
    /// Groups of one partition.
    Groups(Uuid),
    /// Credential history of the agents of one partition.
    Credentials(Uuid),
}

impl Region {
    /// Returns the owning partition of a partition-scoped region.
    #[must_use]
    pub const fn partition(&self) -> Option<Uuid> {
        match self {
            Self::Partitions | Self::Relationships => None,
            Self::Agents(id) | Self::Roles(id) | Self::Groups(id) | Self::Credentials(id) => {
                Some(*id)
            }
        }
    }

    /// Returns the types stored in this region.
    #[must_use]
    pub const fn type_keys(&self) -> &'static [TypeKey] {
        match self {
            Self::Partitions => &[TypeKey::Realm, TypeKey::Tier],
            Self::Relationships => &[TypeKey::Grant, TypeKey::GroupMembership, TypeKey::GroupRole],
            Self::Agents(_) => &[TypeKey::Agent, TypeKey::User],
            Self::Roles(_) => &[TypeKey::Role],
            Self::Groups(_) => &[TypeKey::Group],
            Self::Credentials(_) => &[TypeKey::Credential],
        }
    }

    /// Returns the file name used by file-based backends.
    #[must_use]
    pub const fn file_name(&self) -> &'static str {
        match self {
            Self::Partitions => "partitions.json",
            Self::Relationships => "relationships.json",
            Self::Agents(_) => "agents.json",
            Self::Roles(_) => "roles.json",
            Self::Groups(_) => "groups.json",
            Self::Credentials(_) => "credentials.json",
        }
    }

    /// Returns the region holding identities of `key` in `partition`.
    #[must_use]
    pub const fn for_identity(key: TypeKey, partition: Uuid) -> Option<Self> {
        match key {
            TypeKey::Agent | TypeKey::User => Some(Self::Agents(partition)),
            TypeKey::Role => Some(Self::Roles(partition)),
            TypeKey::Group => Some(Self::Groups(partition)),
            _ => None,
        }
    }

    /// Returns the identity regions of a partition.
    #[must_use]
    pub const fn identity_regions(partition: Uuid) -> [Self; 3] {
        [
            Self::Agents(partition),
            Self::Roles(partition),
            Self::Groups(partition),
        ]
    }

    /// Returns every region scoped to a partition.
    #[must_use]
    pub const fn partition_regions(partition: Uuid) -> [Self; 4] {
        [
            Self::Agents(partition),
            Self::Roles(partition),
            Self::Groups(partition),
            Self::Credentials(partition),
        ]
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.partition() {
            Some(partition) => write!(f, "{partition}/{}", self.file_name()),
            None => f.write_str(self.file_name()),
        }
    }
}

/// One mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Inserts or replaces a record.
    Put {
        /// Target region.
        region: Region,
        /// Full record.
        record: EntityRecord,
    },
    /// Deletes a record; deleting an absent record is not an error.
    Delete {
        /// Target region.
        region: Region,
        /// Entity id.
        id: Uuid,
    },
    /// Prepares storage for a new partition.
    InitPartition(Uuid),
    /// Drops every record scoped to a partition.
    DropPartition(Uuid),
}

/// Ordered mutations applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a put.
    pub fn put(&mut self, region: Region, record: EntityRecord) -> &mut Self {
        self.ops.push(WriteOp::Put { region, record });
        self
    }

    /// Appends a delete.
    pub fn delete(&mut self, region: Region, id: Uuid) -> &mut Self {
        self.ops.push(WriteOp::Delete { region, id });
        self
    }

    /// Appends a partition initialization.
    pub fn init_partition(&mut self, partition: Uuid) -> &mut Self {
        self.ops.push(WriteOp::InitPartition(partition));
        self
    }

    /// Appends a partition drop.
    pub fn drop_partition(&mut self, partition: Uuid) -> &mut Self {
        self.ops.push(WriteOp::DropPartition(partition));
        self
    }

    /// Returns the operations in order.
    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consumes the batch.
    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A consistent read-only state of a backend.
///
/// Every load through one snapshot sees the same set of committed batches,
/// however many commits land while the snapshot is alive.
#[async_trait]
pub trait StoreSnapshot: Send + Sync {
    /// Loads every record of a region ordered by entity id.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Io` or a driver error if the region cannot be
    /// read.
    async fn load(&self, region: Region) -> StorageResult<Vec<EntityRecord>>;
}

/// Persistence backend.
///
/// Implementations must be thread-safe and support concurrent reads while a
/// commit is in flight.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Loads every record of a region ordered by entity id.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Io` or a driver error if the region cannot be
    /// read.
    async fn load(&self, region: Region) -> StorageResult<Vec<EntityRecord>>;

    /// Pins the committed state for a sequence of loads.
    ///
    /// A backend may hold back commits until the snapshot is dropped, so a
    /// caller must drop it before committing.
    ///
    /// ## Errors
    ///
    /// Returns a driver error if the state cannot be pinned.
    async fn snapshot(&self) -> StorageResult<Arc<dyn StoreSnapshot>>;

    /// Applies a batch atomically.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Io` or a driver error; on error no operation
    /// of the batch is visible.
    async fn commit(&self, batch: WriteBatch) -> StorageResult<()>;
}
