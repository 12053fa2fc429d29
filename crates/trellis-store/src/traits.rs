//! Store traits: the abstract interfaces for kernel persistence.
//!
//! Each concern (memberships, grants, creator revocations, projections,
//! audit) is its own trait so embedders can mix backends; [`Store`] is the
//! blanket supertrait the kernel is generic over. Implementations include
//! SQLite (primary) and in-memory (for tests and embedding).

use async_trait::async_trait;

use trellis_core::{
    AuditEvent, ContainerId, CreatorRevocation, EntityGrant, EntityInfo, EntityRef, GroupId,
    GroupRecord, Membership, Projection, ProjectionId, ProjectionStatus, Role, Subject, UserId,
};

use crate::error::Result;

/// Result of inserting a uniqueness-constrained row.
///
/// `AlreadyExists` is not an error: the loser of a concurrent insert race
/// observes the existing row and moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<T> {
    /// The row was inserted.
    Inserted,
    /// An active row for the same key already exists.
    AlreadyExists {
        /// The row that occupies the key.
        existing: T,
    },
}

impl<T> InsertOutcome<T> {
    /// Whether the insert actually happened.
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

/// Group membership persistence.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Register a new group.
    async fn create_group(&self, group: &GroupRecord) -> Result<InsertOutcome<GroupRecord>>;

    /// Fetch a group by id.
    async fn get_group(&self, group: &GroupId) -> Result<Option<GroupRecord>>;

    /// List the groups of a container.
    async fn groups_in_container(&self, container: &ContainerId) -> Result<Vec<GroupRecord>>;

    /// Add a user to a group. Idempotent: re-adding returns the existing
    /// membership.
    async fn add_member(
        &self,
        group: &GroupId,
        user: &UserId,
        at: i64,
    ) -> Result<InsertOutcome<Membership>>;

    /// Remove a user from a group. Returns whether a membership was removed.
    async fn remove_member(&self, group: &GroupId, user: &UserId) -> Result<bool>;

    /// Current members of a group.
    async fn members_of(&self, group: &GroupId) -> Result<Vec<UserId>>;

    /// The groups a user belongs to within one container.
    async fn groups_of(&self, user: &UserId, container: &ContainerId) -> Result<Vec<GroupId>>;

    /// Remove a user from every group of a container as one atomic unit.
    ///
    /// Returns the number of memberships removed. A failure mid-cascade
    /// rolls back completely; a concurrent reader never observes a partial
    /// removal.
    async fn remove_from_container_groups(
        &self,
        user: &UserId,
        container: &ContainerId,
    ) -> Result<usize>;
}

/// Entity grant persistence. Rows are append-only; revocation stamps the row.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Insert a grant. Returns `AlreadyExists` with the active row when one
    /// exists for the same (entity, subject) tuple.
    async fn insert_grant(&self, grant: &EntityGrant) -> Result<InsertOutcome<EntityGrant>>;

    /// Revoke the active grant for a tuple. Idempotent: returns the
    /// newly-revoked row, or `None` when no active grant existed.
    async fn revoke_grant(
        &self,
        entity: &EntityRef,
        subject: &Subject,
        revoked_by: &UserId,
        at: i64,
    ) -> Result<Option<EntityGrant>>;

    /// The active grant for a tuple, if any.
    async fn active_grant(
        &self,
        entity: &EntityRef,
        subject: &Subject,
    ) -> Result<Option<EntityGrant>>;

    /// All active grants on an entity (resolver query).
    async fn active_grants_for_entity(&self, entity: &EntityRef) -> Result<Vec<EntityGrant>>;

    /// All active grants held by a subject ("what can I access" query).
    async fn active_grants_for_subject(&self, subject: &Subject) -> Result<Vec<EntityGrant>>;

    /// Every grant row ever written for an entity, revoked rows included.
    async fn grant_history_for_entity(&self, entity: &EntityRef) -> Result<Vec<EntityGrant>>;
}

/// Creator revocation persistence. Rows are permanent.
#[async_trait]
pub trait CreatorRightsStore: Send + Sync {
    /// Record a creator revocation. Recording the same pair twice returns
    /// the original row.
    async fn record_creator_revocation(
        &self,
        revocation: &CreatorRevocation,
    ) -> Result<InsertOutcome<CreatorRevocation>>;

    /// Whether the creator right for (entity, user) has been revoked.
    async fn is_creator_revoked(&self, entity: &EntityRef, user: &UserId) -> Result<bool>;
}

/// Projection persistence. Rows are never deleted.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Insert a projection. Returns `AlreadyExists` with the active row when
    /// one exists for the same (item, subject) — the uniqueness constraint
    /// ranges over active (pending/accepted) rows only.
    async fn insert_projection(&self, projection: &Projection)
        -> Result<InsertOutcome<Projection>>;

    /// Fetch a projection by id.
    async fn get_projection(&self, id: &ProjectionId) -> Result<Option<Projection>>;

    /// Every projection row for an item, any status.
    async fn projections_for_item(&self, item: &EntityRef) -> Result<Vec<Projection>>;

    /// Every projection row targeting a user, any status.
    async fn projections_for_subject(&self, subject: &UserId) -> Result<Vec<Projection>>;

    /// All rows for one (item, subject) pair, any status.
    async fn projections_for_item_and_subject(
        &self,
        item: &EntityRef,
        subject: &UserId,
    ) -> Result<Vec<Projection>>;

    /// Compare-and-set status transition. Returns the updated row, or `None`
    /// when the row is missing or its status no longer equals `from`.
    async fn transition_status(
        &self,
        id: &ProjectionId,
        from: ProjectionStatus,
        to: ProjectionStatus,
        at: i64,
    ) -> Result<Option<Projection>>;

    /// Set the per-viewer completion field. Returns the updated row, or
    /// `None` when the row is missing.
    async fn set_completed(
        &self,
        id: &ProjectionId,
        completed_at: Option<i64>,
    ) -> Result<Option<Projection>>;
}

/// The audit log sink. Events are immutable once appended.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one event.
    async fn append_event(&self, event: &AuditEvent) -> Result<()>;

    /// Events concerning one entity, oldest first.
    async fn events_for_entity(&self, entity: &EntityRef) -> Result<Vec<AuditEvent>>;
}

/// The full storage surface the kernel is generic over.
pub trait Store:
    MembershipStore + GrantStore + CreatorRightsStore + ProjectionStore + AuditStore
{
}

impl<S> Store for S where
    S: MembershipStore + GrantStore + CreatorRightsStore + ProjectionStore + AuditStore
{
}

// ─────────────────────────────────────────────────────────────────────────
// External read-only providers
// ─────────────────────────────────────────────────────────────────────────

/// The external container membership registry.
///
/// The kernel reads base roles through this boundary and never writes to it.
#[async_trait]
pub trait ContainerDirectory: Send + Sync {
    /// The floor role a subject holds in a container, if any.
    async fn base_role(&self, subject: &Subject, container: &ContainerId)
        -> Result<Option<Role>>;

    /// Whether the container exists at all.
    async fn container_exists(&self, container: &ContainerId) -> Result<bool>;
}

/// The external entity registry.
///
/// The kernel reads `created_by`, the container and the shared render
/// fields; it never mutates entity records.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    /// Everything the kernel reads about an entity.
    async fn entity_info(&self, entity: &EntityRef) -> Result<Option<EntityInfo>>;
}
