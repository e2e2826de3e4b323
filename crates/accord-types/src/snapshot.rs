use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content-addressed identifier of a directory tree.
///
/// A `SnapshotId` is the SHA-256 hash of a tree's sorted, normalized relative
/// paths and file bytes. Identical trees always produce the same id, making
/// snapshots verifiable merge ancestors and rollback targets. Snapshots are
/// immutable: the id is computed once and never changes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId([u8; 32]);

impl SnapshotId {
    /// Create a `SnapshotId` from a pre-computed hash.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The null snapshot id (all zeros). Represents "no snapshot".
    pub const fn null() -> Self {
        Self([0u8; 32])
    }

    /// Returns `true` if this is the null snapshot id.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", self.short_hex())
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for SnapshotId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_all_zeros() {
        let null = SnapshotId::null();
        assert!(null.is_null());
        assert_eq!(null.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn hex_roundtrip() {
        let id = SnapshotId::from_hash([7u8; 32]);
        let parsed = SnapshotId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = SnapshotId::from_hex("abcd").unwrap_err();
        assert_eq!(err, TypeError::InvalidLength { expected: 32, actual: 2 });
    }

    #[test]
    fn from_hex_rejects_bad_chars() {
        assert!(matches!(SnapshotId::from_hex("zz"), Err(TypeError::InvalidHex(_))));
    }

    #[test]
    fn short_hex_is_8_chars() {
        let id = SnapshotId::from_hash([0xAB; 32]);
        assert_eq!(id.short_hex(), "abababab");
    }

    #[test]
    fn display_is_full_hex() {
        let id = SnapshotId::from_hash([1u8; 32]);
        assert_eq!(format!("{id}").len(), 64);
    }

    #[test]
    fn serde_roundtrip() {
        let id = SnapshotId::from_hash([9u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        let parsed: SnapshotId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
