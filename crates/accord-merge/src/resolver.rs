//! External resolver contract.
//!
//! The automated conflict-resolution "brain" lives outside this system and
//! is consumed through this narrow interface. Resolvers may run arbitrarily
//! long; cancellation is cooperative only — implementations poll the token
//! between discrete steps, and nothing ever kills a resolver thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use accord_types::{ConflictRegion, Resolution};

/// Everything a resolver gets to see about one conflict.
#[derive(Clone, Debug)]
pub struct ResolutionRequest {
    pub file_path: String,
    pub patch_name: String,
    pub conflict_num: u32,
    pub option_a: String,
    pub option_b: String,
}

impl ResolutionRequest {
    pub fn from_region(region: &ConflictRegion, patch_name: &str) -> Self {
        Self {
            file_path: region.file_path.clone(),
            patch_name: patch_name.to_string(),
            conflict_num: region.conflict_num,
            option_a: region.option_a.clone(),
            option_b: region.option_b.clone(),
        }
    }
}

/// Cooperative cancellation flag shared between the coordinator and a
/// running resolver.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect the next time the holder polls.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Decides conflicts the cache could not.
///
/// Returning `None` leaves the conflict standing for the next attempt (or
/// for the merge to fail once attempts are exhausted).
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, request: &ResolutionRequest, cancel: &CancelToken) -> Option<Resolution>;
}

/// Never resolves anything. Default when no external brain is attached.
pub struct NoResolver;

impl ConflictResolver for NoResolver {
    fn resolve(&self, _request: &ResolutionRequest, _cancel: &CancelToken) -> Option<Resolution> {
        None
    }
}

/// Always settles on a fixed choice. Useful for tests and drills.
pub struct FixedResolver(pub Resolution);

impl ConflictResolver for FixedResolver {
    fn resolve(&self, _request: &ResolutionRequest, cancel: &CancelToken) -> Option<Resolution> {
        if cancel.is_cancelled() {
            return None;
        }
        Some(self.0.clone())
    }
}
