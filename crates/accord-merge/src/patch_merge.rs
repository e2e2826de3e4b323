//! Three-way merge of two patches against their common base snapshot.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use accord_diff::{apply_with, Applied, ApplyOptions, DiffError};
use accord_types::{ConflictRegion, FileChange, Patch};

use crate::conflicts::extract_regions;
use crate::diff3::merge_lines;
use crate::error::{MergeError, MergeResult};
use crate::sanity::lost_code_warnings;

/// Read access to base snapshot file contents.
///
/// The merge engine never walks the snapshot itself; it asks for exactly the
/// files both patches touch. `Ok(None)` means the file does not exist in the
/// base (the new-file case).
pub trait BaseSource {
    fn read(&self, path: &str) -> MergeResult<Option<String>>;
}

/// In-memory base, used by tests and by callers that already hold content.
#[derive(Debug, Default)]
pub struct MemoryBase {
    files: HashMap<String, String>,
}

impl MemoryBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> &mut Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl BaseSource for MemoryBase {
    fn read(&self, path: &str) -> MergeResult<Option<String>> {
        Ok(self.files.get(path).cloned())
    }
}

/// A snapshot materialized as a plain directory tree.
#[derive(Debug)]
pub struct DirBase {
    root: PathBuf,
}

impl DirBase {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BaseSource for DirBase {
    fn read(&self, path: &str) -> MergeResult<Option<String>> {
        match std::fs::read_to_string(self.root.join(path)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MergeError::Io(e)),
        }
    }
}

/// The outcome of merging patches: the combined patch, the conflict regions
/// still embedded in it, and advisory lost-code warnings.
#[derive(Clone, Debug)]
pub struct PatchMerge {
    pub patch: Patch,
    pub conflicts: Vec<ConflictRegion>,
    pub warnings: Vec<String>,
}

impl PatchMerge {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Merge two patches sharing one base snapshot.
///
/// Files touched by only one patch pass through unchanged. Files touched by
/// both are materialized against the base, merged line-wise, and re-emitted
/// as a fresh base→merged diff; conflict markers stay embedded in that diff
/// until resolved.
pub fn merge_patches(base: &dyn BaseSource, a: &Patch, b: &Patch) -> MergeResult<PatchMerge> {
    if a.base_snapshot_id != b.base_snapshot_id {
        return Err(MergeError::BaseMismatch {
            a: a.base_snapshot_id,
            b: b.base_snapshot_id,
        });
    }

    let paths: BTreeSet<&str> = a.paths().chain(b.paths()).collect();

    let mut changes = Vec::new();
    let mut conflicts = Vec::new();
    let mut warnings = Vec::new();

    for path in paths {
        match (a.change_for(path), b.change_for(path)) {
            (Some(ca), None) => changes.push(ca.clone()),
            (None, Some(cb)) => changes.push(cb.clone()),
            (Some(ca), Some(cb)) => {
                let base_text = base.read(path)?.unwrap_or_default();
                let va = apply_lenient(&base_text, &ca.diff, path)?;
                let vb = apply_lenient(&base_text, &cb.diff, path)?;

                let merged = merge_lines(&base_text, &va.text, &vb.text);
                if merged.conflicts > 0 {
                    tracing::debug!(path, regions = merged.conflicts, "merge produced conflicts");
                }
                conflicts.extend(extract_regions(path, &merged.text));
                warnings.extend(
                    lost_code_warnings(&[&va.text, &vb.text], &merged.text)
                        .into_iter()
                        .map(|w| format!("{path}: {w}")),
                );
                changes.push(FileChange::new(path, accord_diff::diff(&base_text, &merged.text)));
            }
            (None, None) => unreachable!("path came from one of the patches"),
        }
    }

    let patch = Patch::new(
        format!("{}+{}", a.name, b.name),
        a.base_snapshot_id,
        changes,
    );
    Ok(PatchMerge {
        patch,
        conflicts,
        warnings,
    })
}

/// Apply a contributed diff, falling back to the smashed-line repair pass
/// when the plain application fails on a locatable/context error.
pub(crate) fn apply_lenient(base: &str, diff: &str, path: &str) -> MergeResult<Applied> {
    match apply_with(base, diff, ApplyOptions::default()) {
        Ok(applied) => Ok(applied),
        Err(first @ (DiffError::HunkNotLocatable { .. } | DiffError::ContextMismatch { .. })) => {
            tracing::warn!(path, error = %first, "plain apply failed; retrying with smashed-line repair");
            apply_with(base, diff, ApplyOptions { repair_smashed: true }).map_err(|source| {
                MergeError::Apply {
                    file: path.to_string(),
                    source,
                }
            })
        }
        Err(source) => Err(MergeError::Apply {
            file: path.to_string(),
            source,
        }),
    }
}
