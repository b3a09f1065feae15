//! Flat-file backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use idm_core::FileStoreConfig;
use idm_storage::{Backend, EntityRecord, Region, StorageResult, StoreSnapshot, WriteBatch};
use parking_lot::RwLock;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{format_error, io_error};
use crate::journal::{self, remove_dir_if_exists, remove_file_if_exists, Journal};
use crate::snapshot::Snapshot;

/// Backend keeping every region in memory and flushing each touched region
/// as a JSON file.
///
/// Layout under the working directory:
///
/// ```text
/// partitions.json
/// relationships.json
/// <partition-id>/agents.json
/// <partition-id>/roles.json
/// <partition-id>/groups.json
/// <partition-id>/credentials.json
/// commit.journal        (only while a commit is being applied)
/// ```
#[derive(Debug)]
pub struct FileBackend {
    working_dir: PathBuf,
    snapshot: RwLock<Arc<Snapshot>>,
    commit_lock: Mutex<()>,
}

impl FileBackend {
    /// Opens the store, loading every region from disk. An interrupted
    /// commit is finished first.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Io` if the directory cannot be prepared or a
    /// file cannot be read, and `StorageError::Serialization` if a file is
    /// malformed.
    pub async fn open(config: &FileStoreConfig) -> StorageResult<Self> {
        let working_dir = config.working_dir.clone();
        let exists = fs::try_exists(&working_dir)
            .await
            .map_err(|e| io_error(&working_dir, &e))?;
        if config.always_create_files && exists {
            tracing::info!(dir = %working_dir.display(), "wiping file store");
            fs::remove_dir_all(&working_dir)
                .await
                .map_err(|e| io_error(&working_dir, &e))?;
        }
        fs::create_dir_all(&working_dir)
            .await
            .map_err(|e| io_error(&working_dir, &e))?;
        journal::replay(&working_dir).await?;
        journal::sweep_staging(&working_dir).await?;

        let mut snapshot = Snapshot::default();
        let partitions = read_region(&region_path(&working_dir, Region::Partitions)).await?;
        let ids: Vec<Uuid> = partitions.iter().map(|r| r.id).collect();
        snapshot.insert_region(Region::Partitions, partitions);
        for partition in ids {
            for region in Region::partition_regions(partition) {
                let records = read_region(&region_path(&working_dir, region)).await?;
                snapshot.insert_region(region, records);
            }
        }
        let relationships = read_region(&region_path(&working_dir, Region::Relationships)).await?;
        snapshot.insert_region(Region::Relationships, relationships);

        tracing::info!(dir = %working_dir.display(), "file store opened");
        Ok(Self {
            working_dir,
            snapshot: RwLock::new(Arc::new(snapshot)),
            commit_lock: Mutex::new(()),
        })
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshot.read())
    }

    /// Removes the staging files and journal of an abandoned commit.
    async fn discard(&self, journal: &Journal) {
        for rename in &journal.renames {
            let staged = self.working_dir.join(&rename.staged);
            if let Err(err) = remove_file_if_exists(&staged).await {
                tracing::warn!(error = %err, "staging file left behind");
            }
        }
        if let Err(err) = Journal::clear(&self.working_dir).await {
            tracing::warn!(error = %err, "commit journal left behind");
        }
    }

    /// Puts back the previous content of regions already replaced by a
    /// failed commit.
    async fn roll_back(&self, journal: &Journal, applied: &[Region], previous: &Snapshot) {
        let mut restored = true;
        for region in applied {
            let target = region_path(&self.working_dir, *region);
            let result = if previous.has_region(*region) {
                let staged = journal.staging_path(&target);
                match stage_region(&staged, &previous.records(*region)).await {
                    Ok(()) => fs::rename(&staged, &target)
                        .await
                        .map_err(|e| io_error(&target, &e)),
                    Err(err) => Err(err),
                }
            } else {
                remove_file_if_exists(&target).await
            };
            if let Err(err) = result {
                tracing::error!(region = %region, error = %err, "region not restored");
                restored = false;
            }
        }
        if restored {
            self.discard(journal).await;
            tracing::warn!(commit = %journal.commit, regions = applied.len(), "commit rolled back");
        } else {
            tracing::error!(commit = %journal.commit, "rollback incomplete, journal kept for the next open");
        }
    }
}

/// Region file relative to the working directory.
fn region_file(region: Region) -> PathBuf {
    match region.partition() {
        Some(partition) => Path::new(&partition.to_string()).join(region.file_name()),
        None => PathBuf::from(region.file_name()),
    }
}

fn region_path(working_dir: &Path, region: Region) -> PathBuf {
    working_dir.join(region_file(region))
}

async fn read_region(path: &Path) -> StorageResult<Vec<EntityRecord>> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(path, &e)),
    };
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&content).map_err(|e| format_error(path, &e))
}

async fn stage_region(staged: &Path, records: &[EntityRecord]) -> StorageResult<()> {
    if let Some(parent) = staged.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, &e))?;
    }
    let content = serde_json::to_vec_pretty(records).map_err(|e| format_error(staged, &e))?;
    let mut file = fs::File::create(staged)
        .await
        .map_err(|e| io_error(staged, &e))?;
    file.write_all(&content)
        .await
        .map_err(|e| io_error(staged, &e))?;
    file.sync_all().await.map_err(|e| io_error(staged, &e))
}

#[async_trait]
impl Backend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&self, region: Region) -> StorageResult<Vec<EntityRecord>> {
        Ok(self.current().records(region))
    }

    async fn snapshot(&self) -> StorageResult<Arc<dyn StoreSnapshot>> {
        Ok(self.current())
    }

    /// Stages every touched region, writes the journal, then renames the
    /// staged files into place. A failed rename restores the regions
    /// already replaced; if that fails too the journal stays and the next
    /// open finishes the commit.
    async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let _guard = self.commit_lock.lock().await;
        let previous = self.current();
        let mut next = Snapshot::clone(&previous);
        let changes = next.apply(batch.ops());

        let mut journal = Journal::new();
        journal.dropped = changes.dropped.iter().copied().collect();
        let regions: Vec<Region> = changes.touched.iter().copied().collect();
        for region in &regions {
            let target = region_file(*region);
            let staged = journal.staging_path(&target);
            journal.rename(staged.clone(), target);
            let result = stage_region(&self.working_dir.join(&staged), &next.records(*region)).await;
            if let Err(err) = result {
                self.discard(&journal).await;
                return Err(err);
            }
        }
        if let Err(err) = journal.write(&self.working_dir).await {
            self.discard(&journal).await;
            return Err(err);
        }

        for (applied, rename) in journal.renames.iter().enumerate() {
            let target = self.working_dir.join(&rename.target);
            let result = fs::rename(self.working_dir.join(&rename.staged), &target)
                .await
                .map_err(|e| io_error(&target, &e));
            if let Err(err) = result {
                self.roll_back(&journal, &regions[..applied], &previous).await;
                return Err(err);
            }
        }
        for partition in &changes.dropped {
            let dir = self.working_dir.join(partition.to_string());
            if let Err(err) = remove_dir_if_exists(&dir).await {
                tracing::warn!(partition = %partition, error = %err, "partition directory left behind");
            }
        }
        if let Err(err) = Journal::clear(&self.working_dir).await {
            tracing::warn!(error = %err, "commit journal left behind");
        }

        tracing::debug!(
            ops = batch.len(),
            regions = regions.len(),
            dropped = changes.dropped.len(),
            "file store commit"
        );
        *self.snapshot.write() = Arc::new(next);
        Ok(())
    }
}
