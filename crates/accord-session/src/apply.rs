//! Applying a merged patch to a working tree.
//!
//! All-or-nothing: every file is staged through the diff engine's atomic
//! write-replace, and the first failure rolls back everything already
//! staged. The working tree is assumed single-writer for the duration — the
//! session protocol never runs two applications concurrently, and nothing
//! here locks against external writers.

use std::path::{Path, PathBuf};

use accord_diff::{apply_with, ApplyOptions, DiffError, FileCommit, SyntaxCheck};
use accord_types::Patch;

use crate::error::{SessionError, SessionResult};

/// Applies patches to one working tree root.
pub struct TreePatcher<'a> {
    root: PathBuf,
    check: &'a dyn SyntaxCheck,
}

impl<'a> TreePatcher<'a> {
    pub fn new(root: impl Into<PathBuf>, check: &'a dyn SyntaxCheck) -> Self {
        Self {
            root: root.into(),
            check,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply every file change in `patch` and finalize immediately. On any
    /// failure the tree is restored to its prior state and the error is
    /// returned.
    pub fn apply_patch(&self, patch: &Patch) -> SessionResult<()> {
        let staged = self.stage_patch(patch)?;
        commit_all(staged)?;
        tracing::info!(patch = %patch.name, files = patch.changes.len(), "patch applied");
        Ok(())
    }

    /// Apply every file change but keep the `.bak` copies alive: the caller
    /// decides later whether the surrounding operation succeeded
    /// ([`commit_all`]) or failed ([`rollback_all`]). A failure mid-way
    /// rolls back everything already staged and returns the error.
    pub fn stage_patch(&self, patch: &Patch) -> SessionResult<Vec<FileCommit>> {
        let mut commits: Vec<FileCommit> = Vec::new();

        for change in &patch.changes {
            match self.stage_change(&change.path, &change.diff) {
                Ok(commit) => commits.push(commit),
                Err(e) => {
                    tracing::warn!(
                        file = %change.path,
                        error = %e,
                        "patch application failed; rolling back staged files"
                    );
                    rollback_all(commits);
                    return Err(e);
                }
            }
        }
        Ok(commits)
    }

    fn stage_change(&self, rel_path: &str, diff: &str) -> SessionResult<FileCommit> {
        let path = self.root.join(rel_path);
        let original = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(SessionError::Io(e)),
        };

        let applied = apply_lenient(&original, diff)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(FileCommit::write(&path, &applied, self.check)?)
    }
}

/// Drop every `.bak`: the surrounding operation succeeded.
pub fn commit_all(staged: Vec<FileCommit>) -> SessionResult<()> {
    for commit in staged {
        commit.commit()?;
    }
    Ok(())
}

/// Restore every staged file to its previous content, last first.
pub fn rollback_all(staged: Vec<FileCommit>) {
    for commit in staged.into_iter().rev() {
        if let Err(e) = commit.rollback() {
            tracing::error!(error = %e, "rollback failed");
        }
    }
}

/// Plain application first, the smashed-line repair pass on a locate or
/// context failure.
fn apply_lenient(original: &str, diff: &str) -> SessionResult<String> {
    match apply_with(original, diff, ApplyOptions::default()) {
        Ok(applied) => Ok(applied.text),
        Err(DiffError::HunkNotLocatable { .. } | DiffError::ContextMismatch { .. }) => {
            let applied = apply_with(original, diff, ApplyOptions { repair_smashed: true })?;
            Ok(applied.text)
        }
        Err(e) => Err(SessionError::Diff(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_diff::{diff, BalancedDelimiters, NoCheck};
    use accord_types::{FileChange, SnapshotId};

    fn base_id() -> SnapshotId {
        SnapshotId::from_hash([1u8; 32])
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn applies_multi_file_patch() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "one\n");
        write(dir.path(), "sub/b.txt", "two\n");

        let patch = Patch::new(
            "p",
            base_id(),
            vec![
                FileChange::new("a.txt", diff("one\n", "ONE\n")),
                FileChange::new("sub/b.txt", diff("two\n", "TWO\n")),
            ],
        );

        let patcher = TreePatcher::new(dir.path(), &NoCheck);
        patcher.apply_patch(&patch).unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "ONE\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("sub/b.txt")).unwrap(), "TWO\n");
        // No .bak files survive a successful application.
        assert!(!dir.path().join("a.txt.bak").exists());
    }

    #[test]
    fn creates_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let patch = Patch::new(
            "p",
            base_id(),
            vec![FileChange::new("fresh/new.txt", diff("", "created\n"))],
        );

        TreePatcher::new(dir.path(), &NoCheck).apply_patch(&patch).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("fresh/new.txt")).unwrap(),
            "created\n"
        );
    }

    #[test]
    fn failure_rolls_back_earlier_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "one\n");
        write(dir.path(), "b.txt", "unrelated\n");

        // Second change cannot apply: its context does not exist in b.txt.
        let patch = Patch::new(
            "p",
            base_id(),
            vec![
                FileChange::new("a.txt", diff("one\n", "ONE\n")),
                FileChange::new("b.txt", "@@ -1,1 +1,1 @@\n-missing context\n+x\n"),
            ],
        );

        let patcher = TreePatcher::new(dir.path(), &NoCheck);
        assert!(patcher.apply_patch(&patch).is_err());

        // a.txt was restored.
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "unrelated\n");
    }

    #[test]
    fn syntax_check_blocks_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.rs", "fn a() {}\n");
        write(dir.path(), "bad.rs", "fn b() {}\n");

        let patch = Patch::new(
            "p",
            base_id(),
            vec![
                FileChange::new("ok.rs", diff("fn a() {}\n", "fn a() { body(); }\n")),
                FileChange::new("bad.rs", diff("fn b() {}\n", "fn b() {\n")),
            ],
        );

        let patcher = TreePatcher::new(dir.path(), &BalancedDelimiters);
        let err = patcher.apply_patch(&patch).unwrap_err();
        assert!(matches!(err, SessionError::Diff(DiffError::SyntaxInvalid { .. })));
        assert_eq!(std::fs::read_to_string(dir.path().join("ok.rs")).unwrap(), "fn a() {}\n");
    }
}
