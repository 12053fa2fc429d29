//! Subjects: the targets of permissions and projections.
//!
//! A subject is dispatched by pattern matching on the tagged union, never by
//! runtime type strings. The string form ("user"/"group"/"team") exists only
//! at the storage and API boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::types::{GroupId, TeamId, UserId};

/// A permission or projection target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    /// An individual user account.
    User(UserId),
    /// A container-scoped group.
    Group(GroupId),
    /// A team. Reserved: parsed and stored, but no current kernel operation
    /// grants to a team.
    Team(TeamId),
}

impl Subject {
    /// The boundary string for this subject's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Subject::User(_) => "user",
            Subject::Group(_) => "group",
            Subject::Team(_) => "team",
        }
    }

    /// The raw identifier, without the kind tag.
    pub fn id(&self) -> &str {
        match self {
            Subject::User(id) => id.as_str(),
            Subject::Group(id) => id.as_str(),
            Subject::Team(id) => id.as_str(),
        }
    }

    /// Parse a `(kind, id)` pair from the storage or API boundary.
    pub fn parse(kind: &str, id: &str) -> Result<Self, ValidationError> {
        if id.is_empty() {
            return Err(ValidationError::EmptySubjectId);
        }
        match kind {
            "user" => Ok(Subject::User(UserId::new(id))),
            "group" => Ok(Subject::Group(GroupId::new(id))),
            "team" => Ok(Subject::Team(TeamId::new(id))),
            other => Err(ValidationError::UnknownSubjectKind(other.to_string())),
        }
    }

    /// The user id, if this subject is a user.
    pub fn as_user(&self) -> Option<&UserId> {
        match self {
            Subject::User(id) => Some(id),
            _ => None,
        }
    }

    /// The group id, if this subject is a group.
    pub fn as_group(&self) -> Option<&GroupId> {
        match self {
            Subject::Group(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

impl From<UserId> for Subject {
    fn from(id: UserId) -> Self {
        Subject::User(id)
    }
}

impl From<GroupId> for Subject {
    fn from(id: GroupId) -> Self {
        Subject::Group(id)
    }
}
