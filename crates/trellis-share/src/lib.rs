//! # Trellis Share
//!
//! Projection-based distribution: one authoritative item made visible to
//! many subjects through derived, revocable, non-authoritative references.
//!
//! ## Overview
//!
//! - [`DistributionService`] creates projections for the current members of
//!   a group, diffing against projections issued by earlier runs. Members
//!   with an existing projection in any status are skipped: redistribution
//!   never silently resets a decision, and a member who declined stays
//!   declined until an explicit re-invite.
//! - [`ProjectionLifecycle`] drives the per-projection state machine
//!   (`pending -> accepted | declined`, `accepted -> revoked`) and the
//!   per-viewer completion flag.
//! - [`consistency`] holds the conflict layer: shared fields resolve back
//!   to the single authoritative record at render time, and concurrent
//!   source edits are decided by last-writer-wins over `updated_at`.
//!
//! Group membership changes never touch already-issued projections; they
//! only change who future distribution runs reach.

pub mod consistency;
pub mod distribute;
pub mod error;

pub use consistency::{decide_edit, resolve_view, EditDecision, SharedItemView};
pub use distribute::{
    DistributionOptions, DistributionReport, DistributionService, MemberOutcome,
    ProjectionLifecycle, SkipReason,
};
pub use error::{Result, ShareError};
