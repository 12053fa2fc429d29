//! Immutable audit events.
//!
//! Every grant create/revoke, creator-rights revocation, and projection
//! status change emits exactly one event. Events are append-only rows;
//! nothing in the kernel updates or deletes them.

use serde::{Deserialize, Serialize};

use crate::entity::EntityRef;
use crate::subject::Subject;
use crate::types::{AuditEventId, UserId};

/// The action recorded by an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    GrantCreated,
    GrantRevoked,
    CreatorRightsRevoked,
    ProjectionCreated,
    ProjectionAccepted,
    ProjectionDeclined,
    ProjectionRevoked,
    ProjectionReinvited,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::GrantCreated => "grant_created",
            AuditAction::GrantRevoked => "grant_revoked",
            AuditAction::CreatorRightsRevoked => "creator_rights_revoked",
            AuditAction::ProjectionCreated => "projection_created",
            AuditAction::ProjectionAccepted => "projection_accepted",
            AuditAction::ProjectionDeclined => "projection_declined",
            AuditAction::ProjectionRevoked => "projection_revoked",
            AuditAction::ProjectionReinvited => "projection_reinvited",
        }
    }
}

/// One immutable audit record.
///
/// `before` and `after` are small JSON snapshots of the affected record, so
/// the trail stays readable without joining back to live tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    /// The user who performed the action.
    pub actor: UserId,
    pub action: AuditAction,
    /// The entity the action concerns.
    pub entity: EntityRef,
    /// The subject whose access changed, when the action targets one.
    pub subject: Option<Subject>,
    /// JSON snapshot of the record before the action, if it existed.
    pub before: Option<String>,
    /// JSON snapshot of the record after the action, if one remains.
    pub after: Option<String>,
    /// Unix milliseconds.
    pub at: i64,
}

impl AuditEvent {
    /// Build an event with a freshly minted id.
    pub fn new(
        actor: UserId,
        action: AuditAction,
        entity: EntityRef,
        subject: Option<Subject>,
        before: Option<String>,
        after: Option<String>,
        at: i64,
    ) -> Self {
        Self {
            id: AuditEventId::generate(),
            actor,
            action,
            entity,
            subject,
            before,
            after,
            at,
        }
    }
}
