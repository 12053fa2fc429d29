//! Roles and resolved permissions.
//!
//! Roles are totally ordered (`Viewer < Editor < Owner`). When several
//! permission sources apply to one subject, they combine by taking the
//! maximum, never by summing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// An access level within a container or on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access.
    Viewer,
    /// Can modify content.
    Editor,
    /// Full control, including managing access of others.
    Owner,
}

impl Role {
    /// Parse the boundary string form.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "viewer" => Ok(Role::Viewer),
            "editor" => Ok(Role::Editor),
            "owner" => Ok(Role::Owner),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }

    /// The boundary string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Owner => "owner",
        }
    }

    /// Combine with another optional source, taking the maximum.
    pub fn max_with(self, other: Option<Role>) -> Role {
        match other {
            Some(o) => self.max(o),
            None => self,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved permission: the effective role plus its capability flags.
///
/// The flags derive from the role through one fixed table; they are never
/// set independently. `role == None` is the no-access floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// The effective role, or `None` for no access.
    pub role: Option<Role>,
    /// Whether the subject may see the entity at all.
    pub can_view: bool,
    /// Whether the subject may modify the entity's content.
    pub can_edit: bool,
    /// Whether the subject may manage access (grant, revoke, distribute).
    pub can_manage: bool,
}

impl Permission {
    /// The no-access floor: returned whenever the subject holds no base role
    /// in the entity's container, and on fail-closed resolution.
    pub const fn no_access() -> Self {
        Self {
            role: None,
            can_view: false,
            can_edit: false,
            can_manage: false,
        }
    }

    /// Map a role to its capability flags.
    ///
    /// The table is fixed: viewer → view; editor → view+edit;
    /// owner → view+edit+manage.
    pub const fn from_role(role: Role) -> Self {
        match role {
            Role::Viewer => Self {
                role: Some(Role::Viewer),
                can_view: true,
                can_edit: false,
                can_manage: false,
            },
            Role::Editor => Self {
                role: Some(Role::Editor),
                can_view: true,
                can_edit: true,
                can_manage: false,
            },
            Role::Owner => Self {
                role: Some(Role::Owner),
                can_view: true,
                can_edit: true,
                can_manage: true,
            },
        }
    }

    /// Whether this permission grants any access at all.
    pub const fn is_no_access(&self) -> bool {
        self.role.is_none()
    }
}

impl From<Option<Role>> for Permission {
    fn from(role: Option<Role>) -> Self {
        match role {
            Some(r) => Permission::from_role(r),
            None => Permission::no_access(),
        }
    }
}
