use std::path::{Path, PathBuf};

use accord_types::SnapshotId;

use crate::error::{StoreError, StoreResult};
use crate::hash::{clear_tree, compute_directory_hash, copy_tree};
use crate::traits::BackupStore;

/// Backup store keeping each snapshot as a plain directory tree named by
/// its hex id.
///
/// Enough to run sessions and tests; the production store lives behind the
/// same trait.
#[derive(Debug)]
pub struct DirBackupStore {
    root: PathBuf,
}

impl DirBackupStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(id.to_hex())
    }
}

impl BackupStore for DirBackupStore {
    fn create_backup(&self, path: &Path) -> StoreResult<(PathBuf, SnapshotId)> {
        let id = compute_directory_hash(path)?;
        let slot = self.slot(&id);
        if slot.exists() {
            // Content-addressed: an existing slot is already this tree.
            tracing::debug!(id = %id.short_hex(), "backup already present");
            return Ok((slot, id));
        }
        copy_tree(path, &slot)?;
        tracing::info!(id = %id.short_hex(), "created backup");
        Ok((slot, id))
    }

    fn restore_backup(&self, id: &SnapshotId, target_path: &Path) -> StoreResult<bool> {
        let slot = self.slot(id);
        if !slot.is_dir() {
            return Ok(false);
        }
        std::fs::create_dir_all(target_path)?;
        clear_tree(target_path)?;
        copy_tree(&slot, target_path)?;
        tracing::info!(id = %id.short_hex(), target = %target_path.display(), "restored backup");
        Ok(true)
    }

    fn list_backups(&self) -> StoreResult<Vec<SnapshotId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Ok(id) = SnapshotId::from_hex(&entry.file_name().to_string_lossy()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn backup_path(&self, id: &SnapshotId) -> StoreResult<Option<PathBuf>> {
        let slot = self.slot(id);
        if slot.is_dir() {
            Ok(Some(slot))
        } else {
            Ok(None)
        }
    }
}

/// Convenience wrapper returning `BackupMissing` instead of `false`.
pub fn require_backup(store: &dyn BackupStore, id: &SnapshotId) -> StoreResult<PathBuf> {
    store
        .backup_path(id)?
        .ok_or(StoreError::BackupMissing(*id))
}
