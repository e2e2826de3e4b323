//! Atomic file replacement with caller-scoped rollback.
//!
//! A patched file is written to a temp file in the target's directory and
//! renamed into place, so readers never observe a half-written file. The
//! previous content is kept in a `.bak` sibling until the caller-level
//! surrounding operation (typically a whole multi-file patch) succeeds;
//! until then the write can be rolled back exactly.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{DiffError, DiffResult};
use crate::syntax::SyntaxCheck;

/// One pending file replacement.
///
/// Call [`FileCommit::commit`] once the surrounding operation succeeded to
/// drop the `.bak`, or [`FileCommit::rollback`] to restore the previous
/// content. Dropping without either leaves the `.bak` in place so a later
/// recovery pass can still restore it.
#[derive(Debug)]
pub struct FileCommit {
    path: PathBuf,
    bak_path: PathBuf,
    had_original: bool,
}

impl FileCommit {
    /// Validate `content` and atomically replace `path` with it.
    ///
    /// The syntax check runs first; on failure nothing is touched and
    /// `SyntaxInvalid` is returned.
    pub fn write(path: &Path, content: &str, check: &dyn SyntaxCheck) -> DiffResult<Self> {
        if let Err(reason) = check.check(&path.display().to_string(), content) {
            return Err(DiffError::SyntaxInvalid {
                path: path.display().to_string(),
                reason,
            });
        }

        let bak_path = bak_path_for(path);
        let had_original = path.exists();
        if had_original {
            fs::copy(path, &bak_path)?;
        }

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new_in(".")?,
        };
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| DiffError::Io(e.error))?;

        Ok(Self {
            path: path.to_path_buf(),
            bak_path,
            had_original,
        })
    }

    /// The surrounding operation succeeded: delete the `.bak`.
    pub fn commit(self) -> DiffResult<()> {
        if self.had_original && self.bak_path.exists() {
            fs::remove_file(&self.bak_path)?;
        }
        Ok(())
    }

    /// The surrounding operation failed: restore the previous content (or
    /// remove the file if it did not exist before).
    pub fn rollback(self) -> DiffResult<()> {
        if self.had_original {
            fs::rename(&self.bak_path, &self.path)?;
        } else if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// The path being replaced.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn bak_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}
