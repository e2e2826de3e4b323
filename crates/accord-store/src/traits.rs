use std::path::{Path, PathBuf};

use accord_types::SnapshotId;

use crate::error::StoreResult;

/// The backup store contract.
///
/// All implementations must satisfy these invariants:
/// - Backups are immutable once created; the id is the content hash of the
///   backed-up tree, so identical trees deduplicate.
/// - `create_backup` hashes exactly what [`crate::compute_directory_hash`]
///   hashes: junk entries are neither stored nor counted.
/// - `restore_backup` leaves the target equal (by content hash) to the tree
///   that was backed up, and returns `false` when the id is unknown.
/// - All I/O errors are propagated, never silently ignored.
pub trait BackupStore: Send + Sync {
    /// Back up the tree at `path`. Returns where the backup lives and its
    /// content-hash id.
    fn create_backup(&self, path: &Path) -> StoreResult<(PathBuf, SnapshotId)>;

    /// Restore a backup into `target_path`. Returns `false` if no backup
    /// with that id exists.
    fn restore_backup(&self, id: &SnapshotId, target_path: &Path) -> StoreResult<bool>;

    /// Ids of all stored backups.
    fn list_backups(&self) -> StoreResult<Vec<SnapshotId>>;

    /// Whether a backup with this id exists.
    fn has_backup(&self, id: &SnapshotId) -> StoreResult<bool> {
        Ok(self.list_backups()?.contains(id))
    }

    /// Filesystem location of a stored backup, if present. Used to serve
    /// snapshot transfers.
    fn backup_path(&self, id: &SnapshotId) -> StoreResult<Option<PathBuf>>;
}
