//! Entity grant and creator revocation records.
//!
//! Grants are append-only rows: a role change is revoke-then-recreate, never
//! an in-place update. A row with `revoked_at == None` is active; at most one
//! active row may exist per (entity, subject) tuple.

use serde::{Deserialize, Serialize};

use crate::entity::EntityRef;
use crate::role::Role;
use crate::subject::Subject;
use crate::types::UserId;

/// An explicit, revocable permission scoped to one entity and one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityGrant {
    pub entity: EntityRef,
    pub subject: Subject,
    pub role: Role,
    pub created_by: UserId,
    /// Unix milliseconds.
    pub created_at: i64,
    pub revoked_by: Option<UserId>,
    /// Unix milliseconds. `None` while the grant is active.
    pub revoked_at: Option<i64>,
}

impl EntityGrant {
    /// Build a new active grant.
    pub fn new(
        entity: EntityRef,
        subject: Subject,
        role: Role,
        created_by: UserId,
        created_at: i64,
    ) -> Self {
        Self {
            entity,
            subject,
            role,
            created_by,
            created_at,
            revoked_by: None,
            revoked_at: None,
        }
    }

    /// Whether this row is the active grant for its tuple.
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }

    /// Mark the grant revoked. Idempotent at the record level: revoking an
    /// already-revoked row keeps the original revocation.
    pub fn revoke(&mut self, by: UserId, at: i64) {
        if self.revoked_at.is_none() {
            self.revoked_by = Some(by);
            self.revoked_at = Some(at);
        }
    }
}

/// A permanent revocation of an entity creator's implicit editor right.
///
/// There is no un-revoke: restoring access requires a new [`EntityGrant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorRevocation {
    pub entity: EntityRef,
    /// The creator whose implicit right is revoked.
    pub user: UserId,
    pub revoked_by: UserId,
    /// Unix milliseconds.
    pub revoked_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant() -> EntityGrant {
        EntityGrant::new(
            EntityRef::task("t-1"),
            Subject::User(UserId::new("u-bob")),
            Role::Editor,
            UserId::new("u-alice"),
            1_000,
        )
    }

    #[test]
    fn new_grant_is_active() {
        assert!(grant().is_active());
    }

    #[test]
    fn revoke_stamps_once() {
        let mut g = grant();
        g.revoke(UserId::new("u-alice"), 2_000);
        assert!(!g.is_active());
        assert_eq!(g.revoked_at, Some(2_000));

        // A second revoke does not move the timestamp.
        g.revoke(UserId::new("u-carol"), 3_000);
        assert_eq!(g.revoked_at, Some(2_000));
        assert_eq!(g.revoked_by, Some(UserId::new("u-alice")));
    }
}
