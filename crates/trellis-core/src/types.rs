//! Strong identifier types for the Trellis kernel.
//!
//! All identifiers are string newtypes to prevent misuse at compile time.
//! Identifiers minted by the kernel itself (groups, projections, audit
//! events) are UUID v4 strings; identifiers for externally owned records
//! (users, containers, entities) are opaque and arrive from the outside.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an existing identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

macro_rules! minted_id {
    ($name:ident) => {
        impl $name {
            /// Mint a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }
    };
}

string_id! {
    /// Identifier of a user account. Owned by the external identity system.
    UserId
}

string_id! {
    /// Identifier of a container-scoped group.
    GroupId
}

string_id! {
    /// Identifier of a team. Reserved subject kind; no kernel operation
    /// currently grants to a team.
    TeamId
}

string_id! {
    /// Identifier of a container: the top-level membership scope that
    /// establishes a subject's base role.
    ContainerId
}

string_id! {
    /// Identifier of an entity (track, roadmap item, task, event). Owned by
    /// the external entity registry.
    EntityId
}

string_id! {
    /// Identifier of a projection row.
    ProjectionId
}

string_id! {
    /// Identifier of an audit event.
    AuditEventId
}

minted_id!(GroupId);
minted_id!(ProjectionId);
minted_id!(AuditEventId);
