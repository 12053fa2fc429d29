//! Entity references and the read-only view of externally owned records.
//!
//! The kernel never owns entities. It reads `created_by`, the container, and
//! the shared render fields from the external registry and keys its own
//! records (grants, creator revocations, projections) by [`EntityRef`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::types::{ContainerId, EntityId, UserId};

/// The kind of an entity.
///
/// Tracks, subtracks and roadmap items are structural; tasks and calendar
/// events are distributable to group members as projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Track,
    Subtrack,
    RoadmapItem,
    Task,
    CalendarEvent,
}

impl EntityKind {
    /// Parse the boundary string form.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "track" => Ok(EntityKind::Track),
            "subtrack" => Ok(EntityKind::Subtrack),
            "roadmap_item" => Ok(EntityKind::RoadmapItem),
            "task" => Ok(EntityKind::Task),
            "calendar_event" => Ok(EntityKind::CalendarEvent),
            other => Err(ValidationError::UnknownEntityKind(other.to_string())),
        }
    }

    /// The boundary string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Track => "track",
            EntityKind::Subtrack => "subtrack",
            EntityKind::RoadmapItem => "roadmap_item",
            EntityKind::Task => "task",
            EntityKind::CalendarEvent => "calendar_event",
        }
    }

    /// Whether items of this kind can be distributed as projections.
    pub fn is_distributable(&self) -> bool {
        matches!(self, EntityKind::Task | EntityKind::CalendarEvent)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed reference to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Shorthand for a task reference.
    pub fn task(id: impl Into<EntityId>) -> Self {
        Self::new(EntityKind::Task, id)
    }

    /// Shorthand for a calendar event reference.
    pub fn event(id: impl Into<EntityId>) -> Self {
        Self::new(EntityKind::CalendarEvent, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// The shared fields of a distributable item.
///
/// Projections never copy these; they are resolved back to the single
/// authoritative record at render time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SharedFields {
    pub title: String,
    pub description: Option<String>,
    /// Schedule anchor in Unix milliseconds, when the item has one.
    pub scheduled_at: Option<i64>,
}

/// What the kernel reads about an entity from the external registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub entity: EntityRef,
    /// The container the entity lives in.
    pub container: ContainerId,
    /// The creating user. Source of the implicit creator right.
    pub created_by: UserId,
    /// Last authoritative write, Unix milliseconds. Last-writer-wins key.
    pub updated_at: i64,
    /// Fields resolved into every projection view.
    pub shared: SharedFields,
}
