//! # Trellis Permissions
//!
//! Deterministic multi-source permission resolution.
//!
//! ## Overview
//!
//! Effective permission on an entity is computed fresh on every call by
//! combining up to three independent sources:
//!
//! 1. **Base role** — the floor granted by container membership. Absent base
//!    role means no access, regardless of any other source.
//! 2. **Creator role** — the implicit editor right held by an entity's
//!    creator, unless permanently revoked.
//! 3. **Grant role** — the maximum over the subject's direct entity grant
//!    and the grants of every group the subject belongs to within the
//!    entity's container.
//!
//! Sources combine by taking the maximum under `Viewer < Editor < Owner`,
//! never by summing. Nothing is cached: a revocation is visible on the very
//! next call.
//!
//! ## Failure policy
//!
//! A storage error while computing the creator or grant source makes the
//! whole resolution return no access (logged at `error` level) — resolution
//! fails closed, never open.

pub mod creator;
pub mod error;
pub mod resolver;

pub use creator::CreatorRights;
pub use error::{PermsError, Result};
pub use resolver::Resolver;
