//! Error types for the diff engine.

use thiserror::Error;

/// Errors that can occur while parsing or applying diffs.
///
/// `HunkNotLocatable` and `ContextMismatch` are local failures: they abort a
/// single application and carry a diagnostic snippet of the surrounding
/// content (±5 lines) so the caller can see what the engine saw.
#[derive(Debug, Error)]
pub enum DiffError {
    /// The diff text itself is malformed.
    #[error("malformed diff at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// No position in the search window matched the hunk's anchor lines.
    #[error("hunk {hunk} not locatable near line {expected_line}:\n{snippet}")]
    HunkNotLocatable {
        hunk: usize,
        expected_line: usize,
        snippet: String,
    },

    /// A context or removal line did not match the content at the located
    /// position.
    #[error("hunk {hunk}: context mismatch at line {line}: expected {expected:?}:\n{snippet}")]
    ContextMismatch {
        hunk: usize,
        line: usize,
        expected: String,
        snippet: String,
    },

    /// The produced content failed the pluggable syntax check; nothing was
    /// written.
    #[error("syntax check failed for {path}: {reason}")]
    SyntaxInvalid { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
