//! The consensus session state machine.
//!
//! A `Session` lives for exactly one merge-and-distribute attempt. All state
//! transitions funnel through [`Session::advance`], which validates against
//! the legal transition set; illegal transitions are errors, never silent
//! no-ops. Per-participant progress is tracked in an explicit phase map.

use std::collections::BTreeMap;

use accord_types::{ParticipantId, Patch, SnapshotId};

use crate::error::{SessionError, SessionResult};

/// The session phases, in protocol order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    CollectingSelections,
    AwaitingUploads,
    Merging,
    Distributing,
    AwaitingApplied,
    Started,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Started | Self::Aborted)
    }

    /// The legal transition set.
    fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (CollectingSelections, AwaitingUploads)
                | (AwaitingUploads, Merging)
                | (Merging, Distributing)
                // Empty contribution set: nothing to distribute.
                | (Merging, Started)
                | (Distributing, AwaitingApplied)
                | (AwaitingApplied, Started)
                | (
                    CollectingSelections | AwaitingUploads | Merging | Distributing
                        | AwaitingApplied,
                    Aborted,
                )
        )
    }
}

/// Per-participant progress flags.
#[derive(Clone, Debug, Default)]
pub struct ParticipantPhase {
    pub selection_received: bool,
    pub upload_complete: bool,
    pub patch_received_ack: bool,
    /// `None` until the participant reports; then success or the failure
    /// message.
    pub applied: Option<Result<(), String>>,
    /// Patch names this participant announced.
    pub announced: Vec<String>,
}

/// One merge-and-distribute attempt.
///
/// Destroyed on commit or abort; every new attempt starts a fresh `Session`
/// back in `CollectingSelections`.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    phases: BTreeMap<ParticipantId, ParticipantPhase>,
    /// Fully uploaded patches by name.
    patches: BTreeMap<String, Patch>,
    /// Which participant contributed each patch.
    contributors: BTreeMap<String, ParticipantId>,
    /// The merged patch once MERGING succeeded.
    merged: Option<Patch>,
    /// Merge attempts consumed by the resolution loop (bounded at 3 by the
    /// merge pipeline).
    pub merge_attempts: u32,
}

impl Session {
    pub fn new(participants: impl IntoIterator<Item = ParticipantId>) -> Self {
        let phases = participants
            .into_iter()
            .map(|id| (id, ParticipantPhase::default()))
            .collect();
        Self {
            state: SessionState::CollectingSelections,
            phases,
            patches: BTreeMap::new(),
            contributors: BTreeMap::new(),
            merged: None,
            merge_attempts: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn participants(&self) -> impl Iterator<Item = &ParticipantId> {
        self.phases.keys()
    }

    pub fn phase(&self, id: &ParticipantId) -> Option<&ParticipantPhase> {
        self.phases.get(id)
    }

    /// Validated state transition. The single funnel for every change of
    /// `self.state`.
    pub fn advance(&mut self, next: SessionState) -> SessionResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(SessionError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::info!(from = ?self.state, to = ?next, "session transition");
        self.state = next;
        Ok(())
    }

    /// Abort from any non-terminal state.
    pub fn abort(&mut self) -> SessionResult<()> {
        self.advance(SessionState::Aborted)
    }

    fn phase_mut(&mut self, id: &ParticipantId) -> SessionResult<&mut ParticipantPhase> {
        self.phases
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownParticipant(id.clone()))
    }

    fn expect_state(&self, allowed: &[SessionState], what: &str) -> SessionResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::UnexpectedMessage {
                state: self.state,
                what: what.to_string(),
            })
        }
    }

    /// A participant announced the patches it will contribute (possibly
    /// none). Once every participant has, the session moves to
    /// `AwaitingUploads` (or straight on if everyone was already ready).
    pub fn record_selection(
        &mut self,
        id: &ParticipantId,
        patch_names: Vec<String>,
    ) -> SessionResult<()> {
        self.expect_state(&[SessionState::CollectingSelections], "patches_selection")?;
        let phase = self.phase_mut(id)?;
        phase.selection_received = true;
        phase.upload_complete = patch_names.is_empty();
        phase.announced = patch_names;
        if self.all_selected() {
            self.advance(SessionState::AwaitingUploads)?;
            self.try_begin_merge()?;
        }
        Ok(())
    }

    /// A fully reassembled patch upload.
    pub fn accept_patch(&mut self, id: &ParticipantId, patch: Patch) -> SessionResult<()> {
        self.expect_state(
            &[SessionState::CollectingSelections, SessionState::AwaitingUploads],
            "patch upload",
        )?;
        if !self.phases.contains_key(id) {
            return Err(SessionError::UnknownParticipant(id.clone()));
        }
        tracing::debug!(participant = %id, patch = patch.name, "patch uploaded");
        self.contributors.insert(patch.name.clone(), id.clone());
        self.patches.insert(patch.name.clone(), patch);
        Ok(())
    }

    /// A participant finished uploading everything it announced.
    pub fn record_ready(&mut self, id: &ParticipantId) -> SessionResult<()> {
        self.expect_state(
            &[SessionState::CollectingSelections, SessionState::AwaitingUploads],
            "patches_ready",
        )?;
        self.phase_mut(id)?.upload_complete = true;
        self.try_begin_merge()?;
        Ok(())
    }

    fn all_selected(&self) -> bool {
        self.phases.values().all(|p| p.selection_received)
    }

    /// Every participant selected and finished uploading.
    pub fn all_ready(&self) -> bool {
        self.phases
            .values()
            .all(|p| p.selection_received && p.upload_complete)
    }

    fn try_begin_merge(&mut self) -> SessionResult<()> {
        if self.state == SessionState::AwaitingUploads && self.all_ready() {
            self.advance(SessionState::Merging)?;
        }
        Ok(())
    }

    /// The contributed patches, in deterministic (name) order.
    pub fn contributed_patches(&self) -> Vec<&Patch> {
        self.patches.values().collect()
    }

    /// Who contributed a patch declaring this base (used to source a missing
    /// snapshot).
    pub fn owner_of_base(&self, base: &SnapshotId) -> Option<&ParticipantId> {
        self.patches
            .values()
            .find(|p| p.base_snapshot_id == *base)
            .and_then(|p| self.contributors.get(&p.name))
    }

    /// Validate that every contributed patch declares one common base.
    /// Runs before any merge work; a mismatch names both ids.
    pub fn validate_bases(&self) -> SessionResult<SnapshotId> {
        let mut patches = self.patches.values();
        let first = patches.next().ok_or(SessionError::UnexpectedMessage {
            state: self.state,
            what: "base validation with no patches".into(),
        })?;
        let expected = first.base_snapshot_id;
        for patch in patches {
            if patch.base_snapshot_id != expected {
                return Err(SessionError::IncompatibleBase {
                    expected,
                    found: patch.base_snapshot_id,
                    patch: patch.name.clone(),
                });
            }
        }
        Ok(expected)
    }

    /// Merge finished; begin fanning out `merged`.
    pub fn begin_distribution(&mut self, merged: Patch) -> SessionResult<()> {
        self.expect_state(&[SessionState::Merging], "begin distribution")?;
        self.merged = Some(merged);
        self.advance(SessionState::Distributing)
    }

    pub fn merged_patch(&self) -> Option<&Patch> {
        self.merged.as_ref()
    }

    /// First acknowledgment phase: the merged file arrived.
    pub fn record_received(&mut self, id: &ParticipantId) -> SessionResult<()> {
        self.expect_state(&[SessionState::Distributing], "patch_received")?;
        self.phase_mut(id)?.patch_received_ack = true;
        if self.phases.values().all(|p| p.patch_received_ack) {
            self.advance(SessionState::AwaitingApplied)?;
        }
        Ok(())
    }

    /// Second acknowledgment phase: local application finished. Accepted
    /// while still `Distributing` (a fast participant may apply before
    /// slower peers ack receipt), but only from participants that already
    /// acked receipt.
    pub fn record_applied(
        &mut self,
        id: &ParticipantId,
        result: Result<(), String>,
    ) -> SessionResult<()> {
        self.expect_state(
            &[SessionState::Distributing, SessionState::AwaitingApplied],
            "patch_applied",
        )?;
        let state = self.state;
        let phase = self.phase_mut(id)?;
        if !phase.patch_received_ack {
            return Err(SessionError::UnexpectedMessage {
                state,
                what: format!("patch_applied from {id} before patch_received"),
            });
        }
        phase.applied = Some(result);
        Ok(())
    }

    /// Once every participant reported: `Ok` if all succeeded, otherwise
    /// the failures. `None` while reports are still outstanding.
    #[allow(clippy::type_complexity)]
    pub fn applied_outcome(&self) -> Option<Result<(), Vec<(ParticipantId, String)>>> {
        if self.state != SessionState::AwaitingApplied {
            return None;
        }
        if self.phases.values().any(|p| p.applied.is_none()) {
            return None;
        }
        let failures: Vec<(ParticipantId, String)> = self
            .phases
            .iter()
            .filter_map(|(id, p)| match &p.applied {
                Some(Err(message)) => Some((id.clone(), message.clone())),
                _ => None,
            })
            .collect();
        Some(if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        })
    }
}
