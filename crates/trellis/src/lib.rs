//! # Trellis
//!
//! The unified API for the Trellis sharing system: deterministic
//! multi-source permission resolution combined with projection-based
//! distribution.
//!
//! ## Overview
//!
//! One authoritative item is made visible or editable to many subjects
//! through derived, revocable, non-authoritative projections, while
//! effective permission is computed correctly even when several
//! independent rules apply:
//!
//! - **Base role**: the floor granted by container membership
//! - **Creator rights**: the implicit editor right of an entity's creator
//! - **Entity grants**: explicit grants to users and groups, combined
//!   through group membership indirection
//!
//! ## Key Invariants
//!
//! - Sources combine by maximum under `Viewer < Editor < Owner`; a missing
//!   base role floors everything to no access.
//! - Permission is resolved fresh on every call; a revocation is visible
//!   on the very next resolve.
//! - Grants and projections are append-only; revocation stamps rows and
//!   terminal projection states are retained for audit.
//! - Group membership changes never retroactively alter already-issued
//!   projections.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use trellis::{Kernel, KernelConfig};
//! use trellis::store::{MemoryDirectory, MemoryStore};
//! use trellis::core::{ContainerId, EntityRef, Role, Subject, UserId};
//! use trellis::share::DistributionOptions;
//!
//! async fn example() {
//!     let store = MemoryStore::new();
//!     let directory = MemoryDirectory::new();
//!     // ... seed the directory with containers, base roles, entities ...
//!
//!     let kernel = Kernel::new(store, directory, KernelConfig::default());
//!
//!     let owner = UserId::new("u-owner");
//!     let container = ContainerId::new("c-1");
//!     let task = EntityRef::task("t-1");
//!
//!     // Share the task with a group.
//!     // let group = kernel.create_group(&owner, &container, "design").await.unwrap();
//!     // let report = kernel
//!     //     .distribute(&owner, &task, &group.id, DistributionOptions::default())
//!     //     .await
//!     //     .unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `trellis::core` - Domain primitives (subjects, roles, projections)
//! - `trellis::store` - Storage abstraction, SQLite and in-memory backends
//! - `trellis::perms` - The permission resolver and creator rights
//! - `trellis::share` - Distribution and the consistency layer

pub mod config;
pub mod error;
pub mod kernel;

// Re-export component crates
pub use trellis_core as core;
pub use trellis_perms as perms;
pub use trellis_share as share;
pub use trellis_store as store;

// Re-export main types for convenience
pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use kernel::Kernel;

// Re-export commonly used core types
pub use trellis_core::{
    AuditAction, AuditEvent, ContainerId, EntityGrant, EntityKind, EntityRef, GroupId, Permission,
    Projection, ProjectionId, ProjectionStatus, Role, Subject, UserId,
};
pub use trellis_share::{DistributionOptions, DistributionReport, MemberOutcome, SkipReason};
