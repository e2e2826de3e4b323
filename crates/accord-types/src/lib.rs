//! Foundation types for Accord.
//!
//! Accord lets several participants, each holding local modifications to a
//! shared tree, converge on one agreed-upon combined version before a session
//! may proceed. This crate provides the identity and data types used
//! throughout the system. Every other `accord-*` crate depends on it.
//!
//! # Key Types
//!
//! - [`SnapshotId`] — Content-addressed identifier of a directory tree (SHA-256)
//! - [`Patch`] / [`FileChange`] — A named set of per-file unified diffs relative to one snapshot
//! - [`ConflictRegion`] — A span where automatic merging could not reconcile two edits
//! - [`Resolution`] — How a conflict region was settled
//! - [`ParticipantId`] — One network-connected contributor of patches

pub mod conflict;
pub mod error;
pub mod hash;
pub mod participant;
pub mod patch;
pub mod snapshot;

pub use conflict::{ConflictRegion, Resolution};
pub use error::TypeError;
pub use hash::ContentHasher;
pub use participant::ParticipantId;
pub use patch::{FileChange, Patch, PatchMetadata, METADATA_BODY_LIMIT};
pub use snapshot::SnapshotId;
