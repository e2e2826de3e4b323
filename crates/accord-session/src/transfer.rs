//! Snapshot transfer encoding.
//!
//! A snapshot travels as a bincode-encoded, path-sorted list of
//! `(relative_path, bytes)` pairs, split into protocol chunks by the sender.
//! The receiver materializes it into a directory and recomputes the content
//! hash; a mismatch discards the transfer.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use accord_store::is_junk;

use crate::error::{SessionError, SessionResult};

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    path: String,
    bytes: Vec<u8>,
}

/// Serialize a snapshot directory for the wire.
pub fn encode_snapshot(root: &Path) -> SessionResult<Vec<u8>> {
    let mut entries: Vec<SnapshotEntry> = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| SessionError::InvalidSnapshot(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| SessionError::InvalidSnapshot(e.to_string()))?;
        if is_junk(rel) {
            continue;
        }
        let path = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        entries.push(SnapshotEntry {
            path,
            bytes: std::fs::read(entry.path())?,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    bincode::serialize(&entries).map_err(|e| SessionError::InvalidSnapshot(e.to_string()))
}

/// Materialize a transferred snapshot into `target`. Rejects entries that
/// would escape the target directory.
pub fn decode_snapshot_into(data: &[u8], target: &Path) -> SessionResult<()> {
    let entries: Vec<SnapshotEntry> =
        bincode::deserialize(data).map_err(|e| SessionError::InvalidSnapshot(e.to_string()))?;

    for entry in &entries {
        if entry.path.is_empty() || entry.path.starts_with('/') {
            return Err(SessionError::InvalidSnapshot(format!(
                "bad entry path {:?}",
                entry.path
            )));
        }
        if entry.path.split('/').any(|seg| seg == ".." || seg.is_empty()) {
            return Err(SessionError::InvalidSnapshot(format!(
                "traversal in entry path {:?}",
                entry.path
            )));
        }
        let path = target.join(&entry.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &entry.bytes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_store::compute_directory_hash;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn encode_decode_preserves_hash() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "a.txt", "alpha\n");
        write(src.path(), "deep/nested/b.txt", "beta\n");
        write(src.path(), ".git/config", "skipped\n");

        let encoded = encode_snapshot(src.path()).unwrap();

        let dst = tempfile::tempdir().unwrap();
        decode_snapshot_into(&encoded, dst.path()).unwrap();

        assert_eq!(
            compute_directory_hash(src.path()).unwrap(),
            compute_directory_hash(dst.path()).unwrap()
        );
        assert!(!dst.path().join(".git").exists());
    }

    #[test]
    fn encoding_is_deterministic() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "b.txt", "two\n");
        write(src.path(), "a.txt", "one\n");
        assert_eq!(
            encode_snapshot(src.path()).unwrap(),
            encode_snapshot(src.path()).unwrap()
        );
    }

    #[test]
    fn traversal_entries_rejected() {
        let entries = vec![SnapshotEntry {
            path: "../escape.txt".into(),
            bytes: vec![],
        }];
        let data = bincode::serialize(&entries).unwrap();
        let dst = tempfile::tempdir().unwrap();
        let err = decode_snapshot_into(&data, dst.path()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidSnapshot(_)));
    }

    #[test]
    fn absolute_entries_rejected() {
        let entries = vec![SnapshotEntry {
            path: "/etc/passwd".into(),
            bytes: vec![],
        }];
        let data = bincode::serialize(&entries).unwrap();
        let dst = tempfile::tempdir().unwrap();
        assert!(decode_snapshot_into(&data, dst.path()).is_err());
    }

    #[test]
    fn garbage_payload_rejected() {
        let dst = tempfile::tempdir().unwrap();
        assert!(decode_snapshot_into(&[0xFF, 0x01, 0x02], dst.path()).is_err());
    }
}
