//! Error types for Trellis core.

use thiserror::Error;

/// Validation failures for boundary input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown subject kind: {0:?}")]
    UnknownSubjectKind(String),

    #[error("subject id must not be empty")]
    EmptySubjectId,

    #[error("unknown role: {0:?}")]
    UnknownRole(String),

    #[error("unknown entity kind: {0:?}")]
    UnknownEntityKind(String),

    #[error("unknown projection status: {0:?}")]
    UnknownProjectionStatus(String),

    #[error("entity kind {0} is not distributable")]
    NotDistributable(String),

    #[error("illegal projection transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
}
