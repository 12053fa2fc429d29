//! # Trellis Store
//!
//! Storage abstraction for the Trellis kernel. Provides trait-based
//! interfaces for memberships, grants, creator revocations, projections and
//! audit events, with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! Each storage concern is its own async trait so embedders can mix
//! backends; [`Store`] is the blanket supertrait the kernel is generic over.
//! The primary implementation is [`SqliteStore`], with [`MemoryStore`] for
//! tests and lightweight embedding.
//!
//! The read-only provider traits [`ContainerDirectory`] and
//! [`EntityDirectory`] model the external membership registry and entity
//! records. The kernel only ever reads through them; [`MemoryDirectory`] is
//! the in-memory reference implementation.
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: inserting over an existing active row returns
//!   [`InsertOutcome::AlreadyExists`] carrying the existing record — the
//!   loser of a concurrent race observes "already exists", never an error.
//! - **Append-only revocation**: grants and projections are never deleted;
//!   revocation stamps the row, terminal projection rows are retained.
//! - **Atomic cascade**: removing a user from every group of a container is
//!   one transaction; a mid-cascade failure rolls back completely.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemoryDirectory, MemoryStore};
pub use sqlite::SqliteStore;
pub use traits::{
    AuditStore, ContainerDirectory, CreatorRightsStore, EntityDirectory, GrantStore,
    InsertOutcome, MembershipStore, ProjectionStore, Store,
};
