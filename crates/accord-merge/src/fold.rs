//! N-way merge: a left fold over the contributed patches.

use accord_types::{ConflictRegion, Patch};

use crate::conflicts::extract_regions;
use crate::error::{MergeError, MergeResult};
use crate::patch_merge::{apply_lenient, merge_patches, BaseSource, PatchMerge};

/// Fold all patches into one combined patch:
/// `merge(merge(P1, P2), P3), …` in the given order.
///
/// A non-conflict failure at any step aborts the whole fold. Conflicts do
/// not: they stay embedded in the intermediate patch as marker regions and
/// propagate into the final combined patch, whose conflict list is
/// re-extracted from the final materialized content.
pub fn merge_all(base: &dyn BaseSource, patches: &[&Patch]) -> MergeResult<PatchMerge> {
    let (first, rest) = patches.split_first().ok_or(MergeError::Empty)?;

    let mut acc = PatchMerge {
        patch: (*first).clone(),
        conflicts: Vec::new(),
        warnings: Vec::new(),
    };

    for patch in rest {
        let step = merge_patches(base, &acc.patch, patch)?;
        tracing::debug!(
            left = %acc.patch.name,
            right = %patch.name,
            conflicts = step.conflicts.len(),
            "fold step"
        );
        acc.patch = step.patch;
        acc.warnings.extend(step.warnings);
    }

    acc.conflicts = scan_patch(base, &acc.patch)?;
    Ok(acc)
}

/// The authoritative conflict list of a patch: every file materialized
/// against the base and scanned for marker regions.
pub(crate) fn scan_patch(base: &dyn BaseSource, patch: &Patch) -> MergeResult<Vec<ConflictRegion>> {
    let mut regions = Vec::new();
    for change in &patch.changes {
        let base_text = base.read(&change.path)?.unwrap_or_default();
        let applied = apply_lenient(&base_text, &change.diff, &change.path)?;
        regions.extend(extract_regions(&change.path, &applied.text));
    }
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_diff::diff;
    use accord_types::{FileChange, SnapshotId};

    use crate::patch_merge::MemoryBase;

    fn base_id() -> SnapshotId {
        SnapshotId::from_hash([5u8; 32])
    }

    fn patch_for(name: &str, path: &str, base_text: &str, new_text: &str) -> Patch {
        Patch::new(
            name,
            base_id(),
            vec![FileChange::new(path, diff(base_text, new_text))],
        )
    }

    #[test]
    fn empty_input_rejected() {
        let base = MemoryBase::new();
        assert!(matches!(merge_all(&base, &[]), Err(MergeError::Empty)));
    }

    #[test]
    fn single_patch_passes_through() {
        let mut base = MemoryBase::new();
        base.insert("f", "a\n");
        let p = patch_for("only", "f", "a\n", "b\n");
        let merged = merge_all(&base, &[&p]).unwrap();
        assert_eq!(merged.patch, p);
        assert!(merged.conflicts.is_empty());
    }

    #[test]
    fn three_way_fold_disjoint() {
        let base_text = "a\nb\nc\nd\ne\nf\ng\nh\ni\n";
        let mut base = MemoryBase::new();
        base.insert("f", base_text);

        let p1 = patch_for("p1", "f", base_text, "A\nb\nc\nd\ne\nf\ng\nh\ni\n");
        let p2 = patch_for("p2", "f", base_text, "a\nb\nc\nd\nE\nf\ng\nh\ni\n");
        let p3 = patch_for("p3", "f", base_text, "a\nb\nc\nd\ne\nf\ng\nh\nI\n");

        let merged = merge_all(&base, &[&p1, &p2, &p3]).unwrap();
        assert!(merged.conflicts.is_empty());

        let applied =
            accord_diff::apply(base_text, &merged.patch.change_for("f").unwrap().diff).unwrap();
        assert_eq!(applied.text, "A\nb\nc\nd\nE\nf\ng\nh\nI\n");
    }

    #[test]
    fn conflicts_propagate_through_fold() {
        let base_text = "a\nb\nc\n";
        let mut base = MemoryBase::new();
        base.insert("f", base_text);

        let p1 = patch_for("p1", "f", base_text, "a\nB1\nc\n");
        let p2 = patch_for("p2", "f", base_text, "a\nB2\nc\n");
        let p3 = patch_for("p3", "f", base_text, "a\nb\nc\nd\n");

        let merged = merge_all(&base, &[&p1, &p2, &p3]).unwrap();
        assert_eq!(merged.conflicts.len(), 1);
        assert_eq!(merged.conflicts[0].option_a, "B1\n");
        assert_eq!(merged.conflicts[0].option_b, "B2\n");

        // The disjoint third patch still landed.
        let applied =
            accord_diff::apply(base_text, &merged.patch.change_for("f").unwrap().diff).unwrap();
        assert!(applied.text.ends_with("d\n"));
    }

    #[test]
    fn fold_covers_multiple_files() {
        let mut base = MemoryBase::new();
        base.insert("x", "1\n").insert("y", "2\n");

        let p1 = patch_for("p1", "x", "1\n", "one\n");
        let p2 = patch_for("p2", "y", "2\n", "two\n");

        let merged = merge_all(&base, &[&p1, &p2]).unwrap();
        assert_eq!(merged.patch.changes.len(), 2);
        assert!(merged.conflicts.is_empty());
    }
}
