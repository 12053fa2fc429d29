//! Projections: derived, revocable references to one distributable item.
//!
//! A projection makes a single authoritative item visible to one target
//! subject. Shared fields (title, description, schedule) are resolved back
//! to the source at render time; the projection itself carries only the
//! per-viewer state. Rows are never hard-deleted; every terminal status is
//! retained for audit.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::EntityRef;
use crate::error::ValidationError;
use crate::types::{GroupId, ProjectionId, UserId};

/// Lifecycle state of a projection.
///
/// `pending -> accepted | declined`, `accepted -> revoked`. Declined and
/// revoked are terminal; superseding one requires an explicit re-invite,
/// which creates a fresh row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionStatus {
    Pending,
    Accepted,
    Declined,
    Revoked,
}

impl ProjectionStatus {
    /// Parse the boundary string form.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "pending" => Ok(ProjectionStatus::Pending),
            "accepted" => Ok(ProjectionStatus::Accepted),
            "declined" => Ok(ProjectionStatus::Declined),
            "revoked" => Ok(ProjectionStatus::Revoked),
            other => Err(ValidationError::UnknownProjectionStatus(other.to_string())),
        }
    }

    /// The boundary string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionStatus::Pending => "pending",
            ProjectionStatus::Accepted => "accepted",
            ProjectionStatus::Declined => "declined",
            ProjectionStatus::Revoked => "revoked",
        }
    }

    /// Whether a projection in this status counts against the
    /// one-active-projection-per-(item, subject) constraint.
    pub fn is_active(&self) -> bool {
        matches!(self, ProjectionStatus::Pending | ProjectionStatus::Accepted)
    }

    /// Whether the state machine permits `self -> to`.
    pub fn can_transition_to(&self, to: ProjectionStatus) -> bool {
        matches!(
            (self, to),
            (ProjectionStatus::Pending, ProjectionStatus::Accepted)
                | (ProjectionStatus::Pending, ProjectionStatus::Declined)
                | (ProjectionStatus::Accepted, ProjectionStatus::Revoked)
        )
    }
}

impl fmt::Display for ProjectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-authoritative, per-subject reference to a distributable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub id: ProjectionId,
    /// The authoritative item being projected.
    pub item: EntityRef,
    /// The target user.
    pub subject: UserId,
    /// Provenance: the group this projection was distributed through, if any.
    pub source_group: Option<GroupId>,
    pub status: ProjectionStatus,
    /// Whether the viewer may edit the shared source.
    pub can_edit: bool,
    /// Whether the viewer may mark their own copy complete.
    pub can_complete: bool,
    /// Per-viewer completion, Unix milliseconds. Never stored on the source.
    pub completed_at: Option<i64>,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds of the last status change.
    pub status_changed_at: i64,
}

impl Projection {
    /// Build a fresh pending projection.
    pub fn pending(
        item: EntityRef,
        subject: UserId,
        source_group: Option<GroupId>,
        can_edit: bool,
        can_complete: bool,
        at: i64,
    ) -> Self {
        Self {
            id: ProjectionId::generate(),
            item,
            subject,
            source_group,
            status: ProjectionStatus::Pending,
            can_edit,
            can_complete,
            completed_at: None,
            created_at: at,
            status_changed_at: at,
        }
    }

    /// Apply a status transition, rejecting moves the state machine forbids.
    pub fn transition(&mut self, to: ProjectionStatus, at: i64) -> Result<(), ValidationError> {
        if !self.status.can_transition_to(to) {
            return Err(ValidationError::IllegalTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.status = to;
        self.status_changed_at = at;
        Ok(())
    }
}
