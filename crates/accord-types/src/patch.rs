use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::ContentHasher;
use crate::snapshot::SnapshotId;

/// Maximum length of the literal before/after bodies kept in a metadata
/// sidecar. Longer bodies are truncated for audit, never for application.
pub const METADATA_BODY_LIMIT: usize = 10_000;

/// A single changed file inside a patch: the path relative to the tree root
/// and the unified diff transforming the base version into the new version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub diff: String,
}

impl FileChange {
    pub fn new(path: impl Into<String>, diff: impl Into<String>) -> Self {
        Self { path: path.into(), diff: diff.into() }
    }
}

/// A named set of per-file unified diffs relative to one snapshot.
///
/// A patch is only ever valid against its declared base snapshot; applying it
/// elsewhere is undefined. Changes are sorted by path on construction so that
/// serialization and combined hashing are deterministic regardless of
/// insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub name: String,
    pub base_snapshot_id: SnapshotId,
    pub changes: Vec<FileChange>,
}

impl Patch {
    pub fn new(
        name: impl Into<String>,
        base_snapshot_id: SnapshotId,
        mut changes: Vec<FileChange>,
    ) -> Self {
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            name: name.into(),
            base_snapshot_id,
            changes,
        }
    }

    /// Returns `true` if there are no file changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The diff for `path`, if this patch touches it.
    pub fn change_for(&self, path: &str) -> Option<&FileChange> {
        self.changes.iter().find(|c| c.path == path)
    }

    /// Iterate over touched paths.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.path.as_str())
    }

    /// Serialize to the persisted/wire JSON form.
    pub fn to_json(&self) -> Result<String, TypeError> {
        serde_json::to_string_pretty(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Parse from the persisted/wire JSON form.
    pub fn from_json(s: &str) -> Result<Self, TypeError> {
        serde_json::from_str(s).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// The body bytes that contribute to a combined multi-patch hash: every
    /// change's path and diff in path order.
    pub fn body_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for change in &self.changes {
            out.extend_from_slice(change.path.as_bytes());
            out.push(0x00);
            out.extend_from_slice(change.diff.as_bytes());
            out.push(0x01);
        }
        out
    }

    /// Hash the concatenation of all contributing patch bodies, sorted by
    /// patch name for determinism. Used to key whole-merge cache entries.
    pub fn combined_hash(patches: &[&Patch]) -> [u8; 32] {
        let mut sorted: Vec<&&Patch> = patches.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let mut data = Vec::new();
        for patch in sorted {
            data.extend_from_slice(patch.name.as_bytes());
            data.push(0x00);
            data.extend_from_slice(patch.base_snapshot_id.as_bytes());
            data.extend_from_slice(&patch.body_bytes());
        }
        ContentHasher::COMBINED_PATCH.hash(&data)
    }
}

/// Optional audit sidecar carrying literal before/after bodies for each
/// touched file, truncated at [`METADATA_BODY_LIMIT`] characters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchMetadata {
    pub patch_name: String,
    pub files: Vec<FileBodies>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBodies {
    pub path: String,
    pub before: String,
    pub after: String,
    /// Set when either body was cut at the limit.
    pub truncated: bool,
}

impl PatchMetadata {
    pub fn new(patch_name: impl Into<String>) -> Self {
        Self { patch_name: patch_name.into(), files: Vec::new() }
    }

    /// Record the literal bodies for one file, truncating at the limit.
    pub fn record(&mut self, path: impl Into<String>, before: &str, after: &str) {
        let truncated = before.len() > METADATA_BODY_LIMIT || after.len() > METADATA_BODY_LIMIT;
        self.files.push(FileBodies {
            path: path.into(),
            before: truncate_chars(before),
            after: truncate_chars(after),
            truncated,
        });
    }
}

fn truncate_chars(s: &str) -> String {
    if s.len() <= METADATA_BODY_LIMIT {
        return s.to_string();
    }
    // Cut on a char boundary at or below the limit.
    let mut end = METADATA_BODY_LIMIT;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SnapshotId {
        SnapshotId::from_hash([3u8; 32])
    }

    #[test]
    fn changes_sorted_by_path() {
        let patch = Patch::new(
            "p",
            base(),
            vec![
                FileChange::new("z.txt", "dz"),
                FileChange::new("a.txt", "da"),
            ],
        );
        let paths: Vec<_> = patch.paths().collect();
        assert_eq!(paths, ["a.txt", "z.txt"]);
    }

    #[test]
    fn json_roundtrip() {
        let patch = Patch::new("p", base(), vec![FileChange::new("f", "@@ -1 +1 @@\n-a\n+b\n")]);
        let parsed = Patch::from_json(&patch.to_json().unwrap()).unwrap();
        assert_eq!(patch, parsed);
    }

    #[test]
    fn change_for_finds_touched_path() {
        let patch = Patch::new("p", base(), vec![FileChange::new("f", "d")]);
        assert!(patch.change_for("f").is_some());
        assert!(patch.change_for("g").is_none());
    }

    #[test]
    fn combined_hash_independent_of_order() {
        let p1 = Patch::new("alpha", base(), vec![FileChange::new("f", "d1")]);
        let p2 = Patch::new("beta", base(), vec![FileChange::new("g", "d2")]);
        let h1 = Patch::combined_hash(&[&p1, &p2]);
        let h2 = Patch::combined_hash(&[&p2, &p1]);
        assert_eq!(h1, h2);
    }

    #[test]
    fn combined_hash_sensitive_to_content() {
        let p1 = Patch::new("alpha", base(), vec![FileChange::new("f", "d1")]);
        let p2 = Patch::new("alpha", base(), vec![FileChange::new("f", "d2")]);
        assert_ne!(Patch::combined_hash(&[&p1]), Patch::combined_hash(&[&p2]));
    }

    #[test]
    fn metadata_truncates_long_bodies() {
        let mut meta = PatchMetadata::new("p");
        let long = "x".repeat(METADATA_BODY_LIMIT + 500);
        meta.record("f", &long, "short");
        assert!(meta.files[0].truncated);
        assert_eq!(meta.files[0].before.len(), METADATA_BODY_LIMIT);
        assert_eq!(meta.files[0].after, "short");
    }

    #[test]
    fn metadata_keeps_short_bodies_verbatim() {
        let mut meta = PatchMetadata::new("p");
        meta.record("f", "before", "after");
        assert!(!meta.files[0].truncated);
        assert_eq!(meta.files[0].before, "before");
    }
}
