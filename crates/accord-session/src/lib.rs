//! Session coordination for Accord.
//!
//! One authoritative coordinator drives each merge-and-distribute attempt:
//! it collects per-participant patches, merges them (with cached, bounded
//! conflict resolution), applies the result to its own tree first, fans it
//! out, and gates progress on every participant confirming successful
//! application. A session either reaches `Started` with everyone confirmed
//! or fully resets; there is no partial commit and no mid-state resume.

pub mod apply;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod participant;
pub mod session;
pub mod transfer;

pub use apply::{commit_all, rollback_all, TreePatcher};
pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, SessionOutcome};
pub use error::{SessionError, SessionResult};
pub use participant::{ClientEvent, ParticipantClient};
pub use session::{ParticipantPhase, Session, SessionState};
