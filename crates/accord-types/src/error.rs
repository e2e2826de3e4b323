use thiserror::Error;

/// Errors from foundation type construction and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid participant id: {0}")]
    InvalidParticipantId(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
