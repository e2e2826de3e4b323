//! Cached, bounded, resolver-assisted merge of a whole contribution set.
//!
//! Order of escalation: whole-merge cache, plain fold, then up to
//! [`MAX_MERGE_ATTEMPTS`] resolution rounds. Each round applies cached
//! resolutions first (highest conflict number first, keeping earlier
//! offsets stable), hands the remainder to the external resolver, then
//! re-materializes and re-scans. Conflicts still standing after the last
//! round make the merge unresolvable.

use std::collections::BTreeMap;

use accord_cache::ConflictCache;
use accord_types::{ConflictRegion, Patch, Resolution, SnapshotId};

use crate::error::{MergeError, MergeResult};
use crate::fold::{merge_all, scan_patch};
use crate::patch_merge::{apply_lenient, BaseSource, PatchMerge};
use crate::resolver::{CancelToken, ConflictResolver, ResolutionRequest};
use crate::conflicts::apply_resolution;

/// Hard bound on full merge-resolution cycles.
pub const MAX_MERGE_ATTEMPTS: usize = 3;

/// Drives a complete merge of contributed patches.
pub struct MergePipeline<'a> {
    cache: &'a mut ConflictCache,
    resolver: &'a dyn ConflictResolver,
    cancel: CancelToken,
    attempts_used: usize,
}

impl<'a> MergePipeline<'a> {
    pub fn new(cache: &'a mut ConflictCache, resolver: &'a dyn ConflictResolver) -> Self {
        Self {
            cache,
            resolver,
            cancel: CancelToken::new(),
            attempts_used: 0,
        }
    }

    /// The token a caller can use to cancel a long-running resolution.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Resolution attempts consumed by the most recent [`Self::run`].
    pub fn attempts_used(&self) -> usize {
        self.attempts_used
    }

    /// Merge all contributed patches into one conflict-free combined patch.
    pub fn run(&mut self, base: &dyn BaseSource, patches: &[&Patch]) -> MergeResult<Patch> {
        let combined = Patch::combined_hash(patches);
        if let Some(hit) = self.cache.get_merged_patch(combined) {
            tracing::info!(hash = %hex_prefix(&combined), "whole-merge cache hit");
            return Ok(hit.clone());
        }

        let mut outcome = merge_all(base, patches)?;
        for warning in &outcome.warnings {
            tracing::warn!("{warning}");
        }

        if outcome.conflicts.is_empty() {
            self.cache.store_merged_patch(combined, outcome.patch.clone())?;
            return Ok(outcome.patch);
        }

        let base_id = outcome.patch.base_snapshot_id;
        for attempt in 1..=MAX_MERGE_ATTEMPTS {
            if self.cancel.is_cancelled() {
                return Err(MergeError::Cancelled);
            }
            self.attempts_used = attempt;
            tracing::info!(
                attempt,
                remaining = outcome.conflicts.len(),
                "conflict resolution attempt"
            );
            self.resolve_round(base, &mut outcome, &base_id)?;
            outcome.conflicts = scan_patch(base, &outcome.patch)?;
            if outcome.conflicts.is_empty() {
                self.cache.store_merged_patch(combined, outcome.patch.clone())?;
                return Ok(outcome.patch);
            }
        }

        let first = &outcome.conflicts[0];
        Err(MergeError::Unresolvable {
            attempts: MAX_MERGE_ATTEMPTS,
            file: first.file_path.clone(),
            conflict_num: first.conflict_num,
        })
    }

    /// One resolution round over every conflicted file.
    fn resolve_round(
        &mut self,
        base: &dyn BaseSource,
        outcome: &mut PatchMerge,
        base_id: &SnapshotId,
    ) -> MergeResult<()> {
        let mut by_file: BTreeMap<String, Vec<ConflictRegion>> = BTreeMap::new();
        for region in &outcome.conflicts {
            by_file
                .entry(region.file_path.clone())
                .or_default()
                .push(region.clone());
        }

        let patch_name = outcome.patch.name.clone();
        for (file, mut regions) in by_file {
            let base_text = base.read(&file)?.unwrap_or_default();
            let Some(change) = outcome.patch.change_for(&file) else {
                continue;
            };
            let mut text = apply_lenient(&base_text, &change.diff, &file)?.text;

            // Highest region first: earlier offsets stay valid.
            regions.sort_by(|a, b| b.conflict_num.cmp(&a.conflict_num));
            for region in &regions {
                let resolution = self.resolution_for(region, base_id, &patch_name)?;
                let Some(resolution) = resolution else {
                    continue;
                };
                match apply_resolution(&text, region, &resolution) {
                    Some(updated) => {
                        tracing::debug!(
                            file = %file,
                            region = region.conflict_num,
                            "resolved conflict region"
                        );
                        text = updated;
                    }
                    None => tracing::warn!(
                        file = %file,
                        region = region.conflict_num,
                        "conflict region vanished before resolution"
                    ),
                }
            }

            let new_diff = accord_diff::diff(&base_text, &text);
            if let Some(change) = outcome.patch.changes.iter_mut().find(|c| c.path == file) {
                change.diff = new_diff;
            }
        }
        Ok(())
    }

    /// Cached resolution first; the external resolver on a miss, with the
    /// answer written back to the cache.
    fn resolution_for(
        &mut self,
        region: &ConflictRegion,
        base_id: &SnapshotId,
        patch_name: &str,
    ) -> MergeResult<Option<Resolution>> {
        let hash = region.content_hash();
        if let Some(cached) = self.cache.get_resolution(hash, base_id)? {
            return Ok(Some(cached));
        }
        if self.cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }
        let request = ResolutionRequest::from_region(region, patch_name);
        match self.resolver.resolve(&request, &self.cancel) {
            Some(resolution) => {
                self.cache.store_resolution(hash, base_id, resolution.clone())?;
                Ok(Some(resolution))
            }
            None => Ok(None),
        }
    }
}

fn hex_prefix(hash: &[u8; 32]) -> String {
    hash.iter().take(4).map(|b| format!("{b:02x}")).collect()
}
