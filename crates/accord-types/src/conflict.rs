use serde::{Deserialize, Serialize};

use crate::hash::ContentHasher;

/// A location where two patches altered overlapping content differently.
///
/// Emitted by the merge engine, immutable once emitted, and consumed
/// (resolved) exactly once. `conflict_num` is 1-based, numbered top-down
/// within the file, so resolutions applied highest-number-first leave the
/// line offsets of lower-numbered regions untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRegion {
    pub file_path: String,
    pub conflict_num: u32,
    pub option_a: String,
    pub option_b: String,
}

impl ConflictRegion {
    pub fn new(
        file_path: impl Into<String>,
        conflict_num: u32,
        option_a: impl Into<String>,
        option_b: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            conflict_num,
            option_a: option_a.into(),
            option_b: option_b.into(),
        }
    }

    /// The content hash identifying this conflict for cache lookups:
    /// SHA-256 over both option texts with an unambiguous separator.
    /// Deliberately independent of file path and conflict number, so the
    /// same textual collision recurs as the same key anywhere.
    pub fn content_hash(&self) -> [u8; 32] {
        ContentHasher::CONFLICT.hash_pair(&self.option_a, &self.option_b)
    }
}

/// How a conflict region was settled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Keep side A's text.
    TakeA,
    /// Keep side B's text.
    TakeB,
    /// Replace the whole region with literal text.
    Literal(String),
}

impl Resolution {
    /// The replacement text for a region under this resolution.
    pub fn materialize<'a>(&'a self, region: &'a ConflictRegion) -> &'a str {
        match self {
            Self::TakeA => &region.option_a,
            Self::TakeB => &region.option_b,
            Self::Literal(text) => text,
        }
    }
}
