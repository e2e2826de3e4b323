use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use accord_types::{Patch, Resolution, SnapshotId};

use crate::error::{CacheError, CacheResult};

/// One cached conflict resolution with its reuse counter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionEntry {
    pub resolution: Resolution,
    pub use_count: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheState {
    /// Conflict-hash keys: exact `"{hash}:{base}"` entries plus base-agnostic
    /// `"{hash}:*"` fallbacks.
    resolutions: BTreeMap<String, ResolutionEntry>,
    /// Whole-merge outcomes keyed by combined patch-body hash.
    merged: BTreeMap<String, Patch>,
}

/// Persistent cache of conflict resolutions and merged-patch outcomes.
///
/// Lookups try the exact `(conflict_hash, base)` key first, then the
/// base-agnostic fallback. Every hit bumps the entry's use counter and every
/// mutation persists immediately (atomic temp-write-rename), so a crash
/// never loses more than the in-flight update.
#[derive(Debug)]
pub struct ConflictCache {
    path: Option<PathBuf>,
    state: CacheState,
}

impl ConflictCache {
    /// A cache that lives only in memory. Used by tests and one-shot runs.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: CacheState::default(),
        }
    }

    /// Open (or create) a cache persisted at `path`.
    pub fn open(path: impl Into<PathBuf>) -> CacheResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str(&data).map_err(|e| CacheError::Serialization(e.to_string()))?
        } else {
            CacheState::default()
        };
        Ok(Self {
            path: Some(path),
            state,
        })
    }

    /// Look up a resolution for a conflict, preferring one recorded against
    /// the same base snapshot.
    pub fn get_resolution(
        &mut self,
        conflict_hash: [u8; 32],
        base: &SnapshotId,
    ) -> CacheResult<Option<Resolution>> {
        let keys = [exact_key(conflict_hash, base), fallback_key(conflict_hash)];
        for key in keys {
            if let Some(entry) = self.state.resolutions.get_mut(&key) {
                entry.use_count += 1;
                let resolution = entry.resolution.clone();
                tracing::debug!(key = %key, uses = entry.use_count, "conflict cache hit");
                self.persist()?;
                return Ok(Some(resolution));
            }
        }
        Ok(None)
    }

    /// Record a resolution under both the exact and the base-agnostic key.
    pub fn store_resolution(
        &mut self,
        conflict_hash: [u8; 32],
        base: &SnapshotId,
        resolution: Resolution,
    ) -> CacheResult<()> {
        let entry = ResolutionEntry {
            resolution,
            use_count: 0,
        };
        self.state
            .resolutions
            .insert(exact_key(conflict_hash, base), entry.clone());
        // The fallback entry keeps the highest-signal resolution: last write
        // wins, matching the exact entry just stored.
        self.state
            .resolutions
            .insert(fallback_key(conflict_hash), entry);
        self.persist()
    }

    /// Look up a whole-merge outcome by combined patch-body hash.
    pub fn get_merged_patch(&self, combined_hash: [u8; 32]) -> Option<&Patch> {
        self.state.merged.get(&hex::encode(combined_hash))
    }

    /// Record a whole-merge outcome.
    pub fn store_merged_patch(&mut self, combined_hash: [u8; 32], patch: Patch) -> CacheResult<()> {
        self.state.merged.insert(hex::encode(combined_hash), patch);
        self.persist()
    }

    /// Number of stored resolution entries (exact + fallback).
    pub fn resolution_entries(&self) -> usize {
        self.state.resolutions.len()
    }

    /// Number of stored whole-merge outcomes.
    pub fn merged_entries(&self) -> usize {
        self.state.merged.len()
    }

    /// The use counter for the exact entry, if present. Test/introspection
    /// helper.
    pub fn use_count(&self, conflict_hash: [u8; 32], base: &SnapshotId) -> Option<u64> {
        self.state
            .resolutions
            .get(&exact_key(conflict_hash, base))
            .map(|e| e.use_count)
    }

    fn persist(&self) -> CacheResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = serde_json::to_string_pretty(&self.state)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        atomic_write(path, data.as_bytes())?;
        Ok(())
    }
}

fn exact_key(conflict_hash: [u8; 32], base: &SnapshotId) -> String {
    format!("{}:{}", hex::encode(conflict_hash), base.to_hex())
}

fn fallback_key(conflict_hash: [u8; 32]) -> String {
    format!("{}:*", hex::encode(conflict_hash))
}

fn atomic_write(path: &Path, data: &[u8]) -> CacheResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_types::{ConflictRegion, FileChange};

    fn base() -> SnapshotId {
        SnapshotId::from_hash([1u8; 32])
    }

    fn other_base() -> SnapshotId {
        SnapshotId::from_hash([2u8; 32])
    }

    fn conflict() -> ConflictRegion {
        ConflictRegion::new("f.rs", 1, "left", "right")
    }

    #[test]
    fn miss_on_empty_cache() {
        let mut cache = ConflictCache::in_memory();
        let got = cache.get_resolution(conflict().content_hash(), &base()).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn exact_hit_after_store() {
        let mut cache = ConflictCache::in_memory();
        let hash = conflict().content_hash();
        cache.store_resolution(hash, &base(), Resolution::TakeA).unwrap();
        let got = cache.get_resolution(hash, &base()).unwrap();
        assert_eq!(got, Some(Resolution::TakeA));
    }

    #[test]
    fn fallback_hit_for_different_base() {
        let mut cache = ConflictCache::in_memory();
        let hash = conflict().content_hash();
        cache.store_resolution(hash, &base(), Resolution::TakeB).unwrap();
        // Same conflict text, different base snapshot: fallback entry serves.
        let got = cache.get_resolution(hash, &other_base()).unwrap();
        assert_eq!(got, Some(Resolution::TakeB));
    }

    #[test]
    fn hit_increments_use_count() {
        let mut cache = ConflictCache::in_memory();
        let hash = conflict().content_hash();
        cache.store_resolution(hash, &base(), Resolution::TakeA).unwrap();
        assert_eq!(cache.use_count(hash, &base()), Some(0));
        cache.get_resolution(hash, &base()).unwrap();
        cache.get_resolution(hash, &base()).unwrap();
        assert_eq!(cache.use_count(hash, &base()), Some(2));
    }

    #[test]
    fn merged_patch_roundtrip() {
        let mut cache = ConflictCache::in_memory();
        let patch = Patch::new("combined", base(), vec![FileChange::new("f", "d")]);
        cache.store_merged_patch([9u8; 32], patch.clone()).unwrap();
        assert_eq!(cache.get_merged_patch([9u8; 32]), Some(&patch));
        assert!(cache.get_merged_patch([8u8; 32]).is_none());
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let hash = conflict().content_hash();

        {
            let mut cache = ConflictCache::open(&path).unwrap();
            cache
                .store_resolution(hash, &base(), Resolution::Literal("merged".into()))
                .unwrap();
            cache
                .store_merged_patch([3u8; 32], Patch::new("m", base(), vec![]))
                .unwrap();
        }

        let mut reloaded = ConflictCache::open(&path).unwrap();
        let got = reloaded.get_resolution(hash, &base()).unwrap();
        assert_eq!(got, Some(Resolution::Literal("merged".into())));
        assert_eq!(reloaded.merged_entries(), 1);
    }

    #[test]
    fn use_count_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let hash = conflict().content_hash();

        {
            let mut cache = ConflictCache::open(&path).unwrap();
            cache.store_resolution(hash, &base(), Resolution::TakeA).unwrap();
            cache.get_resolution(hash, &base()).unwrap();
        }

        let reloaded = ConflictCache::open(&path).unwrap();
        assert_eq!(reloaded.use_count(hash, &base()), Some(1));
    }

    #[test]
    fn store_writes_both_keys() {
        let mut cache = ConflictCache::in_memory();
        cache
            .store_resolution(conflict().content_hash(), &base(), Resolution::TakeA)
            .unwrap();
        assert_eq!(cache.resolution_entries(), 2);
    }
}
