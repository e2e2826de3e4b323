//! Wire protocol for Accord.
//!
//! Every message travels as a length-prefixed, tagged, bincode-encoded
//! frame over a persistent stream connection. The message set is closed:
//! decoding maps a fixed tag byte to a known type and nothing is ever
//! resolved from wire-carried strings.

pub mod chunk;
pub mod codec;
pub mod error;
pub mod message;

pub use chunk::{split_into_chunks, ChunkAssembler, CHUNK_SIZE};
pub use codec::SyncCodec;
pub use error::{ProtocolError, ProtocolResult};
pub use message::{SyncMessage, MAX_MESSAGE_SIZE, PROTOCOL_VERSION};
