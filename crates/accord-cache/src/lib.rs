//! Conflict resolution and merged-patch caching.
//!
//! Two caches with one lifetime: individual conflict resolutions keyed by
//! the conflicting option texts, and whole merged-patch outcomes keyed by
//! the combined hash of every contributing patch body. A whole-merge hit
//! replaces the entire resolution pipeline.
//!
//! The cache is an explicit instance constructed once per process and passed
//! into the merge engine and the coordinator. There is no global.

pub mod cache;
pub mod error;

pub use cache::{ConflictCache, ResolutionEntry};
pub use error::{CacheError, CacheResult};
