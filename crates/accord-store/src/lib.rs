//! Snapshot backup store for Accord.
//!
//! Defines the four-operation contract the rest of the system consumes —
//! create, restore, list, and deterministic directory hashing — plus a plain
//! directory-tree implementation sufficient for sessions and tests. The
//! production store is an external collaborator behind the [`BackupStore`]
//! trait; nothing here depends on its storage mechanics.

pub mod dir_store;
pub mod error;
pub mod hash;
pub mod traits;

pub use dir_store::{require_backup, DirBackupStore};
pub use error::{StoreError, StoreResult};
pub use hash::{clear_tree, compute_directory_hash, copy_tree, is_junk};
pub use traits::BackupStore;
