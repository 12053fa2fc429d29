//! Error types for the Kernel.
//!
//! The kernel surfaces one taxonomy to its callers: not-found, validation,
//! conflict (carrying the existing record so the caller can revoke-then-
//! recreate or re-invite), authorization, and storage. Sub-crate errors are
//! folded into these kinds so user-visible messaging can distinguish
//! "already has access" from "you lack permission to grant access here".

use thiserror::Error;

use trellis_core::{ContainerId, EntityGrant, GroupId, Projection, UserId};
use trellis_perms::PermsError;
use trellis_share::ShareError;
use trellis_store::StoreError;

/// Errors that can occur during Kernel operations.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Missing entity, container, group or projection. Surfaced, no retry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input or an illegal state transition.
    #[error("validation error: {0}")]
    Validation(String),

    /// An active grant already occupies the (entity, subject) tuple.
    /// Revoke it first to change the role.
    #[error("subject already holds an active '{}' grant on this entity", .existing.role)]
    DuplicateGrant {
        /// The active grant occupying the tuple.
        existing: EntityGrant,
    },

    /// An active projection already occupies the (item, subject) slot.
    #[error("subject already has access to this item (projection {})", .existing.id)]
    DuplicateProjection {
        /// The active projection occupying the slot.
        existing: Box<Projection>,
    },

    /// The actor lacks the rights for this operation. No partial effect.
    #[error("permission denied: {0}")]
    Authorization(String),

    /// Joining a container-scoped group requires a base role there.
    #[error("user {user} holds no base role in container {container}")]
    BaseRoleRequired {
        user: UserId,
        container: ContainerId,
    },

    /// Grants and distributions never cross containers.
    #[error("group {group} does not belong to container {container}")]
    GroupOutsideContainer {
        group: GroupId,
        container: ContainerId,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<PermsError> for KernelError {
    fn from(e: PermsError) -> Self {
        match e {
            PermsError::ContainerNotFound(c) => KernelError::NotFound(format!("container {c}")),
            PermsError::EntityNotFound(r) => KernelError::NotFound(format!("entity {r}")),
            PermsError::NotAuthorized(msg) => KernelError::Authorization(msg),
            PermsError::Validation(v) => KernelError::Validation(v.to_string()),
            PermsError::Store(s) => KernelError::Store(s),
        }
    }
}

impl From<ShareError> for KernelError {
    fn from(e: ShareError) -> Self {
        match e {
            ShareError::EntityNotFound(r) => KernelError::NotFound(format!("entity {r}")),
            ShareError::GroupNotFound(g) => KernelError::NotFound(format!("group {g}")),
            ShareError::ProjectionNotFound(p) => {
                KernelError::NotFound(format!("projection {p}"))
            }
            ShareError::GroupOutsideContainer { group } => KernelError::Validation(format!(
                "group {group} is not in the item's container"
            )),
            ShareError::ProjectionAlreadyActive { existing } => {
                KernelError::DuplicateProjection { existing }
            }
            ShareError::NotAuthorized(msg) => KernelError::Authorization(msg),
            ShareError::Validation(v) => KernelError::Validation(v.to_string()),
            ShareError::Perms(p) => p.into(),
            ShareError::Store(s) => KernelError::Store(s),
        }
    }
}

impl From<trellis_core::ValidationError> for KernelError {
    fn from(e: trellis_core::ValidationError) -> Self {
        KernelError::Validation(e.to_string())
    }
}

/// Result type for Kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
