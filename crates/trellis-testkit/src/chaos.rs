//! Fault-injecting store wrapper.
//!
//! Wraps [`MemoryStore`] and fails selected read paths on demand. Used to
//! verify that permission resolution fails closed (a broken grant source
//! must yield no access, never a higher role) without touching the paths a
//! test still needs to seed data through.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use trellis_core::{
    AuditEvent, ContainerId, CreatorRevocation, EntityGrant, EntityRef, GroupId, GroupRecord,
    Membership, Projection, ProjectionId, ProjectionStatus, Subject, UserId,
};
use trellis_store::{
    AuditStore, CreatorRightsStore, GrantStore, InsertOutcome, MembershipStore, MemoryStore,
    ProjectionStore, Result, StoreError,
};

/// A [`MemoryStore`] with switchable failure modes on read paths.
#[derive(Default)]
pub struct ChaosStore {
    inner: MemoryStore,
    fail_grant_reads: AtomicBool,
    fail_creator_reads: AtomicBool,
    fail_membership_reads: AtomicBool,
}

impl ChaosStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped store, for direct seeding.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Make grant lookups fail until switched back off.
    pub fn fail_grant_reads(&self, on: bool) {
        self.fail_grant_reads.store(on, Ordering::SeqCst);
    }

    /// Make creator revocation lookups fail until switched back off.
    pub fn fail_creator_reads(&self, on: bool) {
        self.fail_creator_reads.store(on, Ordering::SeqCst);
    }

    /// Make group membership lookups fail until switched back off.
    pub fn fail_membership_reads(&self, on: bool) {
        self.fail_membership_reads.store(on, Ordering::SeqCst);
    }

    fn maybe_fail(&self, flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("injected {what} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for ChaosStore {
    async fn create_group(&self, group: &GroupRecord) -> Result<InsertOutcome<GroupRecord>> {
        self.inner.create_group(group).await
    }

    async fn get_group(&self, group: &GroupId) -> Result<Option<GroupRecord>> {
        self.inner.get_group(group).await
    }

    async fn groups_in_container(&self, container: &ContainerId) -> Result<Vec<GroupRecord>> {
        self.inner.groups_in_container(container).await
    }

    async fn add_member(
        &self,
        group: &GroupId,
        user: &UserId,
        at: i64,
    ) -> Result<InsertOutcome<Membership>> {
        self.inner.add_member(group, user, at).await
    }

    async fn remove_member(&self, group: &GroupId, user: &UserId) -> Result<bool> {
        self.inner.remove_member(group, user).await
    }

    async fn members_of(&self, group: &GroupId) -> Result<Vec<UserId>> {
        self.inner.members_of(group).await
    }

    async fn groups_of(&self, user: &UserId, container: &ContainerId) -> Result<Vec<GroupId>> {
        self.maybe_fail(&self.fail_membership_reads, "membership read")?;
        self.inner.groups_of(user, container).await
    }

    async fn remove_from_container_groups(
        &self,
        user: &UserId,
        container: &ContainerId,
    ) -> Result<usize> {
        self.inner.remove_from_container_groups(user, container).await
    }
}

#[async_trait]
impl GrantStore for ChaosStore {
    async fn insert_grant(&self, grant: &EntityGrant) -> Result<InsertOutcome<EntityGrant>> {
        self.inner.insert_grant(grant).await
    }

    async fn revoke_grant(
        &self,
        entity: &EntityRef,
        subject: &Subject,
        revoked_by: &UserId,
        at: i64,
    ) -> Result<Option<EntityGrant>> {
        self.inner.revoke_grant(entity, subject, revoked_by, at).await
    }

    async fn active_grant(
        &self,
        entity: &EntityRef,
        subject: &Subject,
    ) -> Result<Option<EntityGrant>> {
        self.maybe_fail(&self.fail_grant_reads, "grant read")?;
        self.inner.active_grant(entity, subject).await
    }

    async fn active_grants_for_entity(&self, entity: &EntityRef) -> Result<Vec<EntityGrant>> {
        self.maybe_fail(&self.fail_grant_reads, "grant read")?;
        self.inner.active_grants_for_entity(entity).await
    }

    async fn active_grants_for_subject(&self, subject: &Subject) -> Result<Vec<EntityGrant>> {
        self.maybe_fail(&self.fail_grant_reads, "grant read")?;
        self.inner.active_grants_for_subject(subject).await
    }

    async fn grant_history_for_entity(&self, entity: &EntityRef) -> Result<Vec<EntityGrant>> {
        self.inner.grant_history_for_entity(entity).await
    }
}

#[async_trait]
impl CreatorRightsStore for ChaosStore {
    async fn record_creator_revocation(
        &self,
        revocation: &CreatorRevocation,
    ) -> Result<InsertOutcome<CreatorRevocation>> {
        self.inner.record_creator_revocation(revocation).await
    }

    async fn is_creator_revoked(&self, entity: &EntityRef, user: &UserId) -> Result<bool> {
        self.maybe_fail(&self.fail_creator_reads, "creator read")?;
        self.inner.is_creator_revoked(entity, user).await
    }
}

#[async_trait]
impl ProjectionStore for ChaosStore {
    async fn insert_projection(
        &self,
        projection: &Projection,
    ) -> Result<InsertOutcome<Projection>> {
        self.inner.insert_projection(projection).await
    }

    async fn get_projection(&self, id: &ProjectionId) -> Result<Option<Projection>> {
        self.inner.get_projection(id).await
    }

    async fn projections_for_item(&self, item: &EntityRef) -> Result<Vec<Projection>> {
        self.inner.projections_for_item(item).await
    }

    async fn projections_for_subject(&self, subject: &UserId) -> Result<Vec<Projection>> {
        self.inner.projections_for_subject(subject).await
    }

    async fn projections_for_item_and_subject(
        &self,
        item: &EntityRef,
        subject: &UserId,
    ) -> Result<Vec<Projection>> {
        self.inner.projections_for_item_and_subject(item, subject).await
    }

    async fn transition_status(
        &self,
        id: &ProjectionId,
        from: ProjectionStatus,
        to: ProjectionStatus,
        at: i64,
    ) -> Result<Option<Projection>> {
        self.inner.transition_status(id, from, to, at).await
    }

    async fn set_completed(
        &self,
        id: &ProjectionId,
        completed_at: Option<i64>,
    ) -> Result<Option<Projection>> {
        self.inner.set_completed(id, completed_at).await
    }
}

#[async_trait]
impl AuditStore for ChaosStore {
    async fn append_event(&self, event: &AuditEvent) -> Result<()> {
        self.inner.append_event(event).await
    }

    async fn events_for_entity(&self, entity: &EntityRef) -> Result<Vec<AuditEvent>> {
        self.inner.events_for_entity(entity).await
    }
}
