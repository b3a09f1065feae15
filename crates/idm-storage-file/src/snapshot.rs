//! In-memory region snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use idm_storage::{EntityRecord, Region, StorageResult, StoreSnapshot, WriteOp};
use uuid::Uuid;

/// Effects of applying a batch that must reach disk.
#[derive(Debug, Default)]
pub struct Changes {
    /// Regions whose file must be rewritten.
    pub touched: BTreeSet<Region>,
    /// Partitions whose directory must be removed.
    pub dropped: BTreeSet<Uuid>,
}

/// Immutable view of every region. Commits clone, modify, and swap it.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    regions: HashMap<Region, BTreeMap<Uuid, EntityRecord>>,
}

impl Snapshot {
    /// Installs a region's records.
    pub fn insert_region(&mut self, region: Region, records: Vec<EntityRecord>) {
        self.regions
            .insert(region, records.into_iter().map(|r| (r.id, r)).collect());
    }

    /// Returns a region's records ordered by id.
    #[must_use]
    pub fn records(&self, region: Region) -> Vec<EntityRecord> {
        self.regions
            .get(&region)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns whether the region exists.
    #[must_use]
    pub fn has_region(&self, region: Region) -> bool {
        self.regions.contains_key(&region)
    }

    /// Applies operations in order.
    pub fn apply(&mut self, ops: &[WriteOp]) -> Changes {
        let mut changes = Changes::default();
        for op in ops {
            match op {
                WriteOp::Put { region, record } => {
                    self.regions
                        .entry(*region)
                        .or_default()
                        .insert(record.id, record.clone());
                    changes.touched.insert(*region);
                }
                WriteOp::Delete { region, id } => {
                    if let Some(records) = self.regions.get_mut(region) {
                        if records.remove(id).is_some() {
                            changes.touched.insert(*region);
                        }
                    }
                }
                WriteOp::InitPartition(partition) => {
                    for region in Region::partition_regions(*partition) {
                        self.regions.entry(region).or_default();
                        changes.touched.insert(region);
                    }
                    changes.dropped.remove(partition);
                }
                WriteOp::DropPartition(partition) => {
                    for region in Region::partition_regions(*partition) {
                        self.regions.remove(&region);
                        changes.touched.remove(&region);
                    }
                    changes.dropped.insert(*partition);
                }
            }
        }
        changes
    }
}

#[async_trait]
impl StoreSnapshot for Snapshot {
    async fn load(&self, region: Region) -> StorageResult<Vec<EntityRecord>> {
        Ok(self.records(region))
    }
}
