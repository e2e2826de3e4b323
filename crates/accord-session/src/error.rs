//! Error taxonomy for session coordination.

use thiserror::Error;

use accord_types::{ParticipantId, SnapshotId};

use crate::session::SessionState;

#[derive(Debug, Error)]
pub enum SessionError {
    /// A state-machine transition that is not in the legal set. These are
    /// programming or protocol errors, never silently ignored.
    #[error("illegal session transition: {from:?} -> {to:?}")]
    IllegalTransition { from: SessionState, to: SessionState },

    /// A message arrived in a state that does not accept it.
    #[error("unexpected {what} in state {state:?}")]
    UnexpectedMessage { state: SessionState, what: String },

    #[error("unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    /// A contributed patch declares a different base snapshot than the rest.
    /// Always checked before any merge work.
    #[error("patch {patch} declares base {found}, session base is {expected}")]
    IncompatibleBase {
        expected: SnapshotId,
        found: SnapshotId,
        patch: String,
    },

    #[error("base snapshot backup missing: {0}")]
    BaseBackupMissing(SnapshotId),

    /// A transferred snapshot did not hash to the id it was requested under.
    #[error("snapshot hash verification failed: expected {expected}, got {actual}")]
    HashVerificationFailed {
        expected: SnapshotId,
        actual: SnapshotId,
    },

    #[error("snapshot fetch timed out after {seconds}s")]
    SnapshotFetchTimeout { seconds: u64 },

    /// A participant reported failure applying the merged patch.
    #[error("participant {participant} failed to apply: {message}")]
    RemoteApplyFailed {
        participant: ParticipantId,
        message: String,
    },

    #[error("participant {0} disconnected")]
    Disconnected(ParticipantId),

    #[error("invalid snapshot payload: {0}")]
    InvalidSnapshot(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Protocol(#[from] accord_protocol::ProtocolError),

    #[error(transparent)]
    Merge(#[from] accord_merge::MergeError),

    #[error(transparent)]
    Store(#[from] accord_store::StoreError),

    #[error(transparent)]
    Cache(#[from] accord_cache::CacheError),

    #[error(transparent)]
    Diff(#[from] accord_diff::DiffError),

    #[error(transparent)]
    Types(#[from] accord_types::TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
