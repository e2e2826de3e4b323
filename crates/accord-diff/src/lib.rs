//! Diff engine for Accord.
//!
//! Parses and applies unified-diff text against arbitrary text content.
//! Application is self-healing against minor context drift: hunks that no
//! longer match at their declared position are relocated within a bounded
//! window before the engine gives up.
//!
//! # Key Operations
//!
//! - [`parse`] — Unified diff text into ordered [`Hunk`]s
//! - [`apply`] — Apply a diff, returning the new text and modified line ranges
//! - [`diff`] — Emit a unified diff between two texts
//! - [`FileCommit`] — Atomic write-replace with `.bak` rollback
//! - [`SyntaxCheck`] — Pluggable pre-commit content validation

pub mod apply;
pub mod commit;
pub mod emit;
pub mod error;
pub mod hunk;
pub mod repair;
pub mod syntax;

pub use apply::{apply, apply_with, split_inclusive, Applied, ApplyOptions};
pub use commit::FileCommit;
pub use emit::diff;
pub use error::{DiffError, DiffResult};
pub use hunk::{parse, DiffOp, Hunk};
pub use syntax::{BalancedDelimiters, NoCheck, SyntaxCheck};
