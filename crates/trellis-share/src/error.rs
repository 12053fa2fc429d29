//! Error types for the share module.

use thiserror::Error;

use trellis_core::{EntityRef, GroupId, Projection, ProjectionId};

/// Errors that can occur during distribution and projection operations.
#[derive(Debug, Error)]
pub enum ShareError {
    /// The referenced entity does not exist.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityRef),

    /// The referenced group does not exist.
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    /// The referenced projection does not exist.
    #[error("projection not found: {0}")]
    ProjectionNotFound(ProjectionId),

    /// The target group belongs to a different container than the item.
    #[error("group {group} is not in the item's container")]
    GroupOutsideContainer { group: GroupId },

    /// An active projection already occupies the (item, subject) slot.
    /// Carries the existing row so the caller can show "already has access".
    #[error("an active projection already exists for this subject")]
    ProjectionAlreadyActive { existing: Box<Projection> },

    /// The acting subject lacks the rights for this operation.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Malformed input or an illegal state transition.
    #[error("validation error: {0}")]
    Validation(#[from] trellis_core::ValidationError),

    /// Permission resolution error.
    #[error("permission error: {0}")]
    Perms(#[from] trellis_perms::PermsError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] trellis_store::StoreError),
}

/// Result type for share operations.
pub type Result<T> = std::result::Result<T, ShareError>;
