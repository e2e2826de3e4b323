//! Fixed-size chunking for patch and snapshot transfers.
//!
//! Large payloads travel as 64 KiB slices reassembled by sequence index in
//! an in-memory map. There is no retransmission and no timeout reclaiming an
//! abandoned partial transfer: a lost chunk stalls its transfer until the
//! session is torn down.

use std::collections::{BTreeMap, HashMap};

use crate::error::{ProtocolError, ProtocolResult};

/// Fixed transfer chunk size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Split a payload into [`CHUNK_SIZE`] slices. Empty payloads still produce
/// one empty chunk so the receiver observes the transfer.
pub fn split_into_chunks(data: &[u8]) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return vec![Vec::new()];
    }
    data.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect()
}

#[derive(Debug)]
struct PartialTransfer {
    total: u32,
    chunks: BTreeMap<u32, Vec<u8>>,
}

/// Reassembles chunked transfers keyed by name.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    transfers: HashMap<String, PartialTransfer>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one chunk. Returns the reassembled payload once every chunk
    /// from `0..total_chunks` has arrived.
    pub fn accept(
        &mut self,
        name: &str,
        chunk_num: u32,
        total_chunks: u32,
        data: Vec<u8>,
    ) -> ProtocolResult<Option<Vec<u8>>> {
        if total_chunks == 0 || chunk_num >= total_chunks {
            return Err(ProtocolError::ChunkOutOfRange {
                name: name.to_string(),
                chunk_num,
                total: total_chunks,
            });
        }

        let partial = self
            .transfers
            .entry(name.to_string())
            .or_insert_with(|| PartialTransfer {
                total: total_chunks,
                chunks: BTreeMap::new(),
            });
        if partial.total != total_chunks {
            return Err(ProtocolError::FramingError(format!(
                "chunk total changed mid-transfer for {name}: {} then {total_chunks}",
                partial.total
            )));
        }
        partial.chunks.insert(chunk_num, data);

        if partial.chunks.len() as u32 == partial.total {
            let partial = self.transfers.remove(name).expect("entry exists");
            let mut out = Vec::new();
            for (_, chunk) in partial.chunks {
                out.extend_from_slice(&chunk);
            }
            return Ok(Some(out));
        }
        Ok(None)
    }

    /// Whether a transfer is still missing chunks.
    pub fn is_pending(&self, name: &str) -> bool {
        self.transfers.contains_key(name)
    }

    /// Names of all unfinished transfers.
    pub fn pending(&self) -> Vec<&str> {
        self.transfers.keys().map(String::as_str).collect()
    }

    /// Fail an unfinished transfer, reporting what was missing.
    pub fn abort(&mut self, name: &str) -> ProtocolResult<()> {
        match self.transfers.remove(name) {
            Some(partial) => Err(ProtocolError::TransferIncomplete {
                name: name.to_string(),
                have: partial.chunks.len(),
                want: partial.total as usize,
            }),
            None => Ok(()),
        }
    }
}
