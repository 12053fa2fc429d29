//! Container-scoped groups and their memberships.

use serde::{Deserialize, Serialize};

use crate::types::{ContainerId, GroupId, UserId};

/// A group of users within one container.
///
/// Groups never cross containers: membership eligibility is gated on the
/// user holding a base role in `container`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    pub container: ContainerId,
    pub name: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

impl GroupRecord {
    /// Build a group with a freshly minted id.
    pub fn new(container: ContainerId, name: impl Into<String>, at: i64) -> Self {
        Self {
            id: GroupId::generate(),
            container,
            name: name.into(),
            created_at: at,
        }
    }
}

/// One user's membership in one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub group: GroupId,
    pub user: UserId,
    /// Unix milliseconds.
    pub added_at: i64,
}
