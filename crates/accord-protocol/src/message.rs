use serde::{Deserialize, Serialize};

use accord_types::{ParticipantId, SnapshotId};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// All message types in the patch synchronization protocol.
///
/// The set is closed: every variant has a fixed tag (see
/// [`SyncMessage::type_tag`]) and decoding rejects frames whose tag does not
/// match the decoded variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// First message on a new connection.
    Hello { participant: ParticipantId, version: u32 },
    HelloAck { version: u32 },

    /// Names of the patches this participant will contribute (may be empty).
    PatchesSelection { patch_names: Vec<String> },
    /// One 64 KiB slice of an uploaded patch file.
    PatchChunk {
        patch_name: String,
        chunk_num: u32,
        total_chunks: u32,
        data: Vec<u8>,
    },
    /// All announced patches are fully uploaded.
    PatchesReady,

    /// The merged patch, fanned out to every participant.
    PatchFile {
        filename: String,
        content: Vec<u8>,
        size: u64,
    },
    /// First acknowledgment phase: the file arrived intact.
    PatchReceived,
    /// Second acknowledgment phase: local application finished.
    PatchApplied { success: bool, error: Option<String> },

    /// Session abort: some participants failed to apply.
    PatchSyncFailed {
        reason: String,
        failed_clients: Vec<ParticipantId>,
        details: Vec<String>,
    },
    /// Session abort: merging the contributions failed.
    PatchMergeFailed { reason: String },

    /// The coordinator lacks the base snapshot and asks its owner for it.
    SnapshotRequest { snapshot: SnapshotId },
    /// One 64 KiB slice of a snapshot transfer.
    SnapshotChunk {
        snapshot: SnapshotId,
        chunk_num: u32,
        total_chunks: u32,
        data: Vec<u8>,
    },

    /// Every participant confirmed application; the session may begin.
    GameStart,
}

impl SyncMessage {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Hello { .. } => 1,
            Self::HelloAck { .. } => 2,
            Self::PatchesSelection { .. } => 3,
            Self::PatchChunk { .. } => 4,
            Self::PatchesReady => 5,
            Self::PatchFile { .. } => 6,
            Self::PatchReceived => 7,
            Self::PatchApplied { .. } => 8,
            Self::PatchSyncFailed { .. } => 9,
            Self::PatchMergeFailed { .. } => 10,
            Self::SnapshotRequest { .. } => 11,
            Self::SnapshotChunk { .. } => 12,
            Self::GameStart => 13,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "Hello",
            Self::HelloAck { .. } => "HelloAck",
            Self::PatchesSelection { .. } => "PatchesSelection",
            Self::PatchChunk { .. } => "PatchChunk",
            Self::PatchesReady => "PatchesReady",
            Self::PatchFile { .. } => "PatchFile",
            Self::PatchReceived => "PatchReceived",
            Self::PatchApplied { .. } => "PatchApplied",
            Self::PatchSyncFailed { .. } => "PatchSyncFailed",
            Self::PatchMergeFailed { .. } => "PatchMergeFailed",
            Self::SnapshotRequest { .. } => "SnapshotRequest",
            Self::SnapshotChunk { .. } => "SnapshotChunk",
            Self::GameStart => "GameStart",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant() -> ParticipantId {
        ParticipantId::new("p1").unwrap()
    }

    #[test]
    fn type_tags_unique() {
        let msgs: Vec<SyncMessage> = vec![
            SyncMessage::Hello { participant: participant(), version: 1 },
            SyncMessage::HelloAck { version: 1 },
            SyncMessage::PatchesSelection { patch_names: vec![] },
            SyncMessage::PatchChunk {
                patch_name: String::new(),
                chunk_num: 0,
                total_chunks: 0,
                data: vec![],
            },
            SyncMessage::PatchesReady,
            SyncMessage::PatchFile { filename: String::new(), content: vec![], size: 0 },
            SyncMessage::PatchReceived,
            SyncMessage::PatchApplied { success: true, error: None },
            SyncMessage::PatchSyncFailed {
                reason: String::new(),
                failed_clients: vec![],
                details: vec![],
            },
            SyncMessage::PatchMergeFailed { reason: String::new() },
            SyncMessage::SnapshotRequest { snapshot: SnapshotId::null() },
            SyncMessage::SnapshotChunk {
                snapshot: SnapshotId::null(),
                chunk_num: 0,
                total_chunks: 0,
                data: vec![],
            },
            SyncMessage::GameStart,
        ];
        let mut tags: Vec<u8> = msgs.iter().map(|m| m.type_tag()).collect();
        let len = tags.len();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), len, "type tags should be unique");
    }

    #[test]
    fn type_names_correct() {
        assert_eq!(SyncMessage::GameStart.type_name(), "GameStart");
        assert_eq!(SyncMessage::PatchesReady.type_name(), "PatchesReady");
    }
}
