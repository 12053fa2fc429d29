//! Error types for the permissions module.

use thiserror::Error;

use trellis_core::{ContainerId, EntityRef};

/// Errors that can occur during permission operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// The referenced container does not exist.
    #[error("container not found: {0}")]
    ContainerNotFound(ContainerId),

    /// The referenced entity does not exist.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityRef),

    /// The acting subject lacks the rights for this operation.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Malformed boundary input.
    #[error("validation error: {0}")]
    Validation(#[from] trellis_core::ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] trellis_store::StoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
