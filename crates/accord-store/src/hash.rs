//! Deterministic directory hashing.
//!
//! A snapshot id is the SHA-256 over a directory's sorted, normalized
//! relative paths and file bytes: per file the accumulator absorbs
//! `path ‖ 0x00 ‖ bytes ‖ 0x01`. Paths use forward slashes and Unicode NFC,
//! and junk entries are skipped, so the id is stable across platforms,
//! filesystems, and walk order.

use std::path::{Component, Path};

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use accord_types::SnapshotId;

use crate::error::{StoreError, StoreResult};

/// Directory names never included in a snapshot.
const SKIP_DIRS: &[&str] = &[".git", ".accord", "__pycache__", ".hg", ".svn"];

/// File names / suffixes never included in a snapshot.
const SKIP_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];
const SKIP_SUFFIXES: &[&str] = &[".bak", ".tmp", ".pyc"];

/// Returns `true` for entries the hash (and backups) must ignore.
pub fn is_junk(rel_path: &Path) -> bool {
    for component in rel_path.components() {
        let Component::Normal(name) = component else {
            continue;
        };
        let name = name.to_string_lossy();
        if SKIP_DIRS.contains(&name.as_ref()) || SKIP_FILES.contains(&name.as_ref()) {
            return true;
        }
    }
    let name = rel_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    SKIP_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Normalized hash form of a relative path: forward slashes, Unicode NFC.
fn normalize(rel_path: &Path) -> String {
    let joined = rel_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    joined.nfc().collect()
}

/// Compute the content hash of a directory tree.
///
/// Deterministic: repeated calls and different creation/walk orders produce
/// the same id for the same content.
pub fn compute_directory_hash(root: &Path) -> StoreResult<SnapshotId> {
    if !root.is_dir() {
        return Err(StoreError::NotADirectory(root.to_path_buf()));
    }

    let mut files: Vec<(String, std::path::PathBuf)> = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| StoreError::Walk(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| StoreError::Walk(e.to_string()))?;
        if is_junk(rel) {
            continue;
        }
        files.push((normalize(rel), entry.path().to_path_buf()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (rel, abs) in &files {
        hasher.update(rel.as_bytes());
        hasher.update([0x00]);
        hasher.update(std::fs::read(abs)?);
        hasher.update([0x01]);
    }
    Ok(SnapshotId::from_hash(hasher.finalize().into()))
}

/// Copy a tree from `src` to `dst`, skipping junk entries. `dst` is created
/// as needed; existing files are overwritten.
pub fn copy_tree(src: &Path, dst: &Path) -> StoreResult<()> {
    if !src.is_dir() {
        return Err(StoreError::NotADirectory(src.to_path_buf()));
    }
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| StoreError::Walk(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| StoreError::Walk(e.to_string()))?;
        if rel.as_os_str().is_empty() || is_junk(rel) {
            continue;
        }
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove every non-junk entry under `root`, leaving skipped entries (VCS
/// metadata, backups) untouched.
pub fn clear_tree(root: &Path) -> StoreResult<()> {
    if !root.is_dir() {
        return Err(StoreError::NotADirectory(root.to_path_buf()));
    }
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let rel = Path::new(&entry.file_name()).to_path_buf();
        if is_junk(&rel) {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
