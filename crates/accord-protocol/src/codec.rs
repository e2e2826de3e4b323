use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{SyncMessage, MAX_MESSAGE_SIZE};

/// Codec for encoding/decoding protocol messages.
///
/// Framing: `[4 bytes big-endian length][1 byte tag][bincode payload]`,
/// where length counts the tag byte plus the payload. The tag is carried
/// redundantly and checked against the decoded variant on receive, so a
/// frame never dispatches as a type other than the one it claims.
pub struct SyncCodec;

impl SyncCodec {
    /// Encode a message with framing.
    pub fn encode(msg: &SyncMessage) -> ProtocolResult<Vec<u8>> {
        let payload =
            bincode::serialize(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let len = (payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(4 + 1 + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(msg.type_tag());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode a framed message. Returns `(message, bytes_consumed)`.
    ///
    /// Returns `FramingError` when the buffer does not yet hold a complete
    /// frame; stream readers treat that as "read more".
    pub fn decode(data: &[u8]) -> ProtocolResult<(SyncMessage, usize)> {
        if data.len() < 5 {
            return Err(ProtocolError::FramingError("too short".into()));
        }
        let len = u32::from_be_bytes(data[0..4].try_into().expect("sliced 4 bytes")) as usize;
        if len < 1 {
            return Err(ProtocolError::FramingError("zero-length frame".into()));
        }
        if len - 1 > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: len - 1,
                max: MAX_MESSAGE_SIZE,
            });
        }
        let total = 4 + len;
        if data.len() < total {
            return Err(ProtocolError::FramingError(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let frame_tag = data[4];
        let payload = &data[5..total];
        let msg: SyncMessage = bincode::deserialize(payload)
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        if msg.type_tag() != frame_tag {
            return Err(ProtocolError::TagMismatch {
                frame_tag,
                payload_tag: msg.type_tag(),
            });
        }
        Ok((msg, total))
    }

    /// Whether `data` starts with a complete frame.
    pub fn has_complete_frame(data: &[u8]) -> bool {
        if data.len() < 4 {
            return false;
        }
        let len = u32::from_be_bytes(data[0..4].try_into().expect("sliced 4 bytes")) as usize;
        data.len() >= 4 + len
    }
}
