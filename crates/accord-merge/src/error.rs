//! Error types for the merge engine.

use thiserror::Error;

use accord_diff::DiffError;
use accord_types::SnapshotId;

#[derive(Debug, Error)]
pub enum MergeError {
    /// A contributed diff failed to apply to the base content. Non-conflict
    /// failure: aborts the whole fold.
    #[error("diff application failed for {file}: {source}")]
    Apply {
        file: String,
        #[source]
        source: DiffError,
    },

    /// Patches declare different base snapshots. Session validation should
    /// have caught this earlier; the merge engine refuses regardless.
    #[error("patches declare different base snapshots: {a} vs {b}")]
    BaseMismatch { a: SnapshotId, b: SnapshotId },

    /// Nothing to merge.
    #[error("no patches to merge")]
    Empty,

    /// An unresolved conflict, named by file and region number.
    #[error("merge conflict in {file} (region {conflict_num})")]
    Conflict { file: String, conflict_num: u32 },

    /// The bounded resolution loop exhausted its attempts.
    #[error(
        "merge unresolvable after {attempts} attempts; \
         first remaining conflict in {file} (region {conflict_num})"
    )]
    Unresolvable {
        attempts: usize,
        file: String,
        conflict_num: u32,
    },

    /// Resolution was cancelled cooperatively.
    #[error("conflict resolution cancelled")]
    Cancelled,

    #[error("cache error: {0}")]
    Cache(#[from] accord_cache::CacheError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MergeResult<T> = Result<T, MergeError>;
