use std::path::PathBuf;

use thiserror::Error;

use accord_types::SnapshotId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backup not found: {0}")]
    BackupMissing(SnapshotId),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("walk error: {0}")]
    Walk(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
