//! Merge engine for Accord.
//!
//! Computes three-way merges of divergent patches against a common base
//! snapshot, folds more than two patches iteratively, and drives the bounded
//! automatic conflict resolution loop backed by the conflict cache and an
//! external resolver.
//!
//! # Key Operations
//!
//! - [`merge_lines`] — diff3 line merge of two versions against a base
//! - [`merge_patches`] — three-way merge of two patches
//! - [`merge_all`] — N-way left fold over a patch list
//! - [`MergePipeline`] — cached, bounded, resolver-assisted merge of a
//!   whole contribution set

pub mod conflicts;
pub mod diff3;
pub mod error;
pub mod fold;
pub mod patch_merge;
pub mod pipeline;
pub mod resolver;
pub mod sanity;

pub use conflicts::{apply_resolution, conflict_count, extract_regions};
pub use diff3::{merge_lines, Merged};
pub use error::{MergeError, MergeResult};
pub use fold::merge_all;
pub use patch_merge::{merge_patches, BaseSource, DirBase, MemoryBase, PatchMerge};
pub use pipeline::{MergePipeline, MAX_MERGE_ATTEMPTS};
pub use resolver::{
    CancelToken, ConflictResolver, FixedResolver, NoResolver, ResolutionRequest,
};
pub use sanity::lost_code_warnings;
