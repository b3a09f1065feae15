//! Commit journal.
//!
//! A commit first writes every touched region to a staging file named after
//! the commit, then records the planned renames in `commit.journal`. Writing
//! the journal is the commit point: once it exists, [`replay`] finishes the
//! renames on the next open. Staging files of a commit that never reached
//! its journal are swept away instead.

use std::path::{Path, PathBuf};

use idm_storage::StorageResult;
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::error::{format_error, io_error};

/// File name of the journal inside the working directory.
pub const JOURNAL_FILE: &str = "commit.journal";

const STAGING_SUFFIX: &str = ".tmp";

/// One staged file and the region file it replaces, relative to the
/// working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    /// Staging file.
    pub staged: PathBuf,
    /// Region file.
    pub target: PathBuf,
}

/// The renames and directory removals of one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    /// Commit id, also part of every staging file name.
    pub commit: Uuid,
    /// Renames in application order.
    pub renames: Vec<Rename>,
    /// Partitions whose directory is removed after the renames.
    pub dropped: Vec<Uuid>,
}

impl Journal {
    /// Starts a journal for a new commit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            commit: Uuid::now_v7(),
            ..Self::default()
        }
    }

    /// Returns the staging path for `target` in this commit.
    #[must_use]
    pub fn staging_path(&self, target: &Path) -> PathBuf {
        let mut name = target.as_os_str().to_owned();
        name.push(format!(".{}{STAGING_SUFFIX}", self.commit));
        PathBuf::from(name)
    }

    /// Records that `staged` replaces `target`.
    pub fn rename(&mut self, staged: PathBuf, target: PathBuf) {
        self.renames.push(Rename { staged, target });
    }

    /// Persists the journal, making the commit durable.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Io` if the journal cannot be written.
    pub async fn write(&self, working_dir: &Path) -> StorageResult<()> {
        let path = working_dir.join(JOURNAL_FILE);
        let content = serde_json::to_vec(self).map_err(|e| format_error(&path, &e))?;
        let staging = self.staging_path(&path);
        fs::write(&staging, content)
            .await
            .map_err(|e| io_error(&staging, &e))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|e| io_error(&path, &e))
    }

    /// Reads the journal left by an interrupted commit.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Io` if the file cannot be read and
    /// `StorageError::Serialization` if it is malformed.
    pub async fn read(working_dir: &Path) -> StorageResult<Option<Self>> {
        let path = working_dir.join(JOURNAL_FILE);
        match fs::read(&path).await {
            Ok(content) => serde_json::from_slice(&content)
                .map(Some)
                .map_err(|e| format_error(&path, &e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, &e)),
        }
    }

    /// Deletes the journal once every rename is done or undone.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Io` if the journal exists but cannot be
    /// removed.
    pub async fn clear(working_dir: &Path) -> StorageResult<()> {
        let path = working_dir.join(JOURNAL_FILE);
        remove_file_if_exists(&path).await
    }
}

/// Finishes an interrupted commit. Renames whose staging file is gone were
/// already applied.
///
/// ## Errors
///
/// Returns `StorageError::Io` if a rename or the journal removal fails.
pub async fn replay(working_dir: &Path) -> StorageResult<bool> {
    let Some(journal) = Journal::read(working_dir).await? else {
        return Ok(false);
    };
    for rename in &journal.renames {
        let staged = working_dir.join(&rename.staged);
        let target = working_dir.join(&rename.target);
        if !fs::try_exists(&staged).await.map_err(|e| io_error(&staged, &e))? {
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, &e))?;
        }
        fs::rename(&staged, &target)
            .await
            .map_err(|e| io_error(&target, &e))?;
    }
    for partition in &journal.dropped {
        remove_dir_if_exists(&working_dir.join(partition.to_string())).await?;
    }
    Journal::clear(working_dir).await?;
    tracing::warn!(
        commit = %journal.commit,
        renames = journal.renames.len(),
        dropped = journal.dropped.len(),
        "interrupted commit replayed"
    );
    Ok(true)
}

/// Removes staging files left by commits that never reached their journal.
///
/// ## Errors
///
/// Returns `StorageError::Io` if a directory cannot be listed or a staging
/// file cannot be removed.
pub async fn sweep_staging(working_dir: &Path) -> StorageResult<usize> {
    let mut removed = 0;
    let mut dirs = vec![working_dir.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let mut entries = fs::read_dir(&dir).await.map_err(|e| io_error(&dir, &e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, &e))? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| io_error(&path, &e))?;
            if file_type.is_dir() {
                if dir == working_dir {
                    dirs.push(path);
                }
            } else if path.to_string_lossy().ends_with(STAGING_SUFFIX) {
                remove_file_if_exists(&path).await?;
                removed += 1;
            }
        }
    }
    if removed > 0 {
        tracing::debug!(removed, "stale staging files removed");
    }
    Ok(removed)
}

pub(crate) async fn remove_file_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(path, &e)),
    }
}

pub(crate) async fn remove_dir_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(path, &e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_finishes_pending_renames() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::new();
        let target = PathBuf::from("partitions.json");
        let staged = journal.staging_path(&target);
        std::fs::write(dir.path().join(&staged), "[]").unwrap();
        std::fs::write(dir.path().join(&target), "old").unwrap();
        // The second rename was already applied before the interruption.
        let done = PathBuf::from("relationships.json");
        journal.rename(staged, target.clone());
        journal.rename(journal.staging_path(&done), done);
        journal.write(dir.path()).await.unwrap();

        assert!(replay(dir.path()).await.unwrap());

        assert_eq!(std::fs::read_to_string(dir.path().join(target)).unwrap(), "[]");
        assert!(Journal::read(dir.path()).await.unwrap().is_none());
        assert!(!replay(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn sweep_removes_only_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let partition = dir.path().join(Uuid::now_v7().to_string());
        std::fs::create_dir(&partition).unwrap();
        let journal = Journal::new();
        std::fs::write(journal.staging_path(&partition.join("agents.json")), "[]").unwrap();
        std::fs::write(partition.join("roles.json"), "[]").unwrap();

        assert_eq!(sweep_staging(dir.path()).await.unwrap(), 1);
        let left: Vec<_> = std::fs::read_dir(&partition)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, ["roles.json"]);
    }

    #[test]
    fn staging_names_carry_the_commit() {
        let journal = Journal::new();
        let staged = journal.staging_path(Path::new("a/agents.json"));
        assert_eq!(
            staged,
            PathBuf::from(format!("a/agents.json.{}.tmp", journal.commit))
        );
    }
}
