use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("framing error: {0}")]
    FramingError(String),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("frame tag {frame_tag} does not match payload tag {payload_tag}")]
    TagMismatch { frame_tag: u8, payload_tag: u8 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("transfer incomplete for {name}: have {have} of {want} chunks")]
    TransferIncomplete {
        name: String,
        have: usize,
        want: usize,
    },

    #[error("chunk {chunk_num} out of range for {name} (total {total})")]
    ChunkOutOfRange {
        name: String,
        chunk_num: u32,
        total: u32,
    },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
