//! In-memory implementation of the store traits.
//!
//! This is primarily for testing and lightweight embedding. It has the same
//! semantics as SQLite but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use trellis_core::{
    AuditEvent, ContainerId, CreatorRevocation, EntityGrant, EntityInfo, EntityRef, GroupId,
    GroupRecord, Membership, Projection, ProjectionId, ProjectionStatus, Role, Subject, UserId,
};

use crate::error::{Result, StoreError};
use crate::traits::{
    AuditStore, ContainerDirectory, CreatorRightsStore, EntityDirectory, GrantStore, InsertOutcome,
    MembershipStore, ProjectionStore,
};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Groups by id.
    groups: HashMap<GroupId, GroupRecord>,

    /// Membership rows: (group, user) -> added_at.
    members: HashMap<(GroupId, UserId), i64>,

    /// Every grant row ever written, revoked rows included.
    grants: Vec<EntityGrant>,

    /// Active-grant index: (entity, subject) -> index into `grants`.
    active_grants: HashMap<(EntityRef, Subject), usize>,

    /// Permanent creator revocations.
    creator_revocations: Vec<CreatorRevocation>,

    /// Projection rows by id.
    projections: HashMap<ProjectionId, Projection>,

    /// Active-projection index: (item, subject) -> projection id.
    active_projections: HashMap<(EntityRef, UserId), ProjectionId>,

    /// Append-only audit log.
    audit: Vec<AuditEvent>,

    /// Test instrumentation: fail the container cascade after this many
    /// memberships have been removed, then roll back.
    cascade_failpoint: Option<usize>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    /// Test instrumentation: make the next container cascade fail after
    /// removing `after` memberships. The cascade must roll back and leave
    /// no partial state. Cleared automatically once it fires.
    pub fn set_cascade_failpoint(&self, after: usize) {
        if let Ok(mut inner) = self.inner.write() {
            inner.cascade_failpoint = Some(after);
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn create_group(&self, group: &GroupRecord) -> Result<InsertOutcome<GroupRecord>> {
        let mut inner = self.write()?;
        if let Some(existing) = inner.groups.get(&group.id) {
            return Ok(InsertOutcome::AlreadyExists {
                existing: existing.clone(),
            });
        }
        inner.groups.insert(group.id.clone(), group.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_group(&self, group: &GroupId) -> Result<Option<GroupRecord>> {
        Ok(self.read()?.groups.get(group).cloned())
    }

    async fn groups_in_container(&self, container: &ContainerId) -> Result<Vec<GroupRecord>> {
        let inner = self.read()?;
        let mut groups: Vec<GroupRecord> = inner
            .groups
            .values()
            .filter(|g| &g.container == container)
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn add_member(
        &self,
        group: &GroupId,
        user: &UserId,
        at: i64,
    ) -> Result<InsertOutcome<Membership>> {
        let mut inner = self.write()?;
        if !inner.groups.contains_key(group) {
            return Err(StoreError::NotFound(format!("group {group}")));
        }
        let key = (group.clone(), user.clone());
        if let Some(&added_at) = inner.members.get(&key) {
            return Ok(InsertOutcome::AlreadyExists {
                existing: Membership {
                    group: group.clone(),
                    user: user.clone(),
                    added_at,
                },
            });
        }
        inner.members.insert(key, at);
        Ok(InsertOutcome::Inserted)
    }

    async fn remove_member(&self, group: &GroupId, user: &UserId) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner
            .members
            .remove(&(group.clone(), user.clone()))
            .is_some())
    }

    async fn members_of(&self, group: &GroupId) -> Result<Vec<UserId>> {
        let inner = self.read()?;
        let mut members: Vec<UserId> = inner
            .members
            .keys()
            .filter(|(g, _)| g == group)
            .map(|(_, u)| u.clone())
            .collect();
        members.sort();
        Ok(members)
    }

    async fn groups_of(&self, user: &UserId, container: &ContainerId) -> Result<Vec<GroupId>> {
        let inner = self.read()?;
        let mut groups: Vec<GroupId> = inner
            .members
            .keys()
            .filter(|(g, u)| {
                u == user
                    && inner
                        .groups
                        .get(g)
                        .is_some_and(|rec| &rec.container == container)
            })
            .map(|(g, _)| g.clone())
            .collect();
        groups.sort();
        Ok(groups)
    }

    async fn remove_from_container_groups(
        &self,
        user: &UserId,
        container: &ContainerId,
    ) -> Result<usize> {
        let mut inner = self.write()?;

        let keys: Vec<(GroupId, UserId)> = inner
            .members
            .keys()
            .filter(|(g, u)| {
                u == user
                    && inner
                        .groups
                        .get(g)
                        .is_some_and(|rec| &rec.container == container)
            })
            .cloned()
            .collect();

        let failpoint = inner.cascade_failpoint.take();

        let mut removed: Vec<((GroupId, UserId), i64)> = Vec::with_capacity(keys.len());
        for key in keys {
            if failpoint.is_some_and(|after| removed.len() >= after) {
                // Roll back everything removed so far: the cascade is all
                // or nothing, a partial count must never be observable.
                for (key, added_at) in removed {
                    inner.members.insert(key, added_at);
                }
                return Err(StoreError::Backend(
                    "injected cascade failure".to_string(),
                ));
            }
            if let Some(added_at) = inner.members.remove(&key) {
                removed.push((key, added_at));
            }
        }

        Ok(removed.len())
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn insert_grant(&self, grant: &EntityGrant) -> Result<InsertOutcome<EntityGrant>> {
        let mut inner = self.write()?;
        let key = (grant.entity.clone(), grant.subject.clone());
        if let Some(&idx) = inner.active_grants.get(&key) {
            return Ok(InsertOutcome::AlreadyExists {
                existing: inner.grants[idx].clone(),
            });
        }
        let idx = inner.grants.len();
        inner.grants.push(grant.clone());
        inner.active_grants.insert(key, idx);
        Ok(InsertOutcome::Inserted)
    }

    async fn revoke_grant(
        &self,
        entity: &EntityRef,
        subject: &Subject,
        revoked_by: &UserId,
        at: i64,
    ) -> Result<Option<EntityGrant>> {
        let mut inner = self.write()?;
        let key = (entity.clone(), subject.clone());
        let Some(idx) = inner.active_grants.remove(&key) else {
            return Ok(None);
        };
        let grant = &mut inner.grants[idx];
        grant.revoke(revoked_by.clone(), at);
        Ok(Some(grant.clone()))
    }

    async fn active_grant(
        &self,
        entity: &EntityRef,
        subject: &Subject,
    ) -> Result<Option<EntityGrant>> {
        let inner = self.read()?;
        Ok(inner
            .active_grants
            .get(&(entity.clone(), subject.clone()))
            .map(|&idx| inner.grants[idx].clone()))
    }

    async fn active_grants_for_entity(&self, entity: &EntityRef) -> Result<Vec<EntityGrant>> {
        let inner = self.read()?;
        let mut grants: Vec<EntityGrant> = inner
            .active_grants
            .iter()
            .filter(|((e, _), _)| e == entity)
            .map(|(_, &idx)| inner.grants[idx].clone())
            .collect();
        grants.sort_by_key(|g| g.created_at);
        Ok(grants)
    }

    async fn active_grants_for_subject(&self, subject: &Subject) -> Result<Vec<EntityGrant>> {
        let inner = self.read()?;
        let mut grants: Vec<EntityGrant> = inner
            .active_grants
            .iter()
            .filter(|((_, s), _)| s == subject)
            .map(|(_, &idx)| inner.grants[idx].clone())
            .collect();
        grants.sort_by_key(|g| g.created_at);
        Ok(grants)
    }

    async fn grant_history_for_entity(&self, entity: &EntityRef) -> Result<Vec<EntityGrant>> {
        let inner = self.read()?;
        Ok(inner
            .grants
            .iter()
            .filter(|g| &g.entity == entity)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CreatorRightsStore for MemoryStore {
    async fn record_creator_revocation(
        &self,
        revocation: &CreatorRevocation,
    ) -> Result<InsertOutcome<CreatorRevocation>> {
        let mut inner = self.write()?;
        if let Some(existing) = inner
            .creator_revocations
            .iter()
            .find(|r| r.entity == revocation.entity && r.user == revocation.user)
        {
            return Ok(InsertOutcome::AlreadyExists {
                existing: existing.clone(),
            });
        }
        inner.creator_revocations.push(revocation.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn is_creator_revoked(&self, entity: &EntityRef, user: &UserId) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner
            .creator_revocations
            .iter()
            .any(|r| &r.entity == entity && &r.user == user))
    }
}

#[async_trait]
impl ProjectionStore for MemoryStore {
    async fn insert_projection(
        &self,
        projection: &Projection,
    ) -> Result<InsertOutcome<Projection>> {
        let mut inner = self.write()?;
        let key = (projection.item.clone(), projection.subject.clone());
        if let Some(existing_id) = inner.active_projections.get(&key) {
            let existing = inner.projections[existing_id].clone();
            return Ok(InsertOutcome::AlreadyExists { existing });
        }
        inner
            .projections
            .insert(projection.id.clone(), projection.clone());
        if projection.status.is_active() {
            inner.active_projections.insert(key, projection.id.clone());
        }
        Ok(InsertOutcome::Inserted)
    }

    async fn get_projection(&self, id: &ProjectionId) -> Result<Option<Projection>> {
        Ok(self.read()?.projections.get(id).cloned())
    }

    async fn projections_for_item(&self, item: &EntityRef) -> Result<Vec<Projection>> {
        let inner = self.read()?;
        let mut rows: Vec<Projection> = inner
            .projections
            .values()
            .filter(|p| &p.item == item)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(rows)
    }

    async fn projections_for_subject(&self, subject: &UserId) -> Result<Vec<Projection>> {
        let inner = self.read()?;
        let mut rows: Vec<Projection> = inner
            .projections
            .values()
            .filter(|p| &p.subject == subject)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(rows)
    }

    async fn projections_for_item_and_subject(
        &self,
        item: &EntityRef,
        subject: &UserId,
    ) -> Result<Vec<Projection>> {
        let inner = self.read()?;
        let mut rows: Vec<Projection> = inner
            .projections
            .values()
            .filter(|p| &p.item == item && &p.subject == subject)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(rows)
    }

    async fn transition_status(
        &self,
        id: &ProjectionId,
        from: ProjectionStatus,
        to: ProjectionStatus,
        at: i64,
    ) -> Result<Option<Projection>> {
        let mut inner = self.write()?;
        let Some(projection) = inner.projections.get_mut(id) else {
            return Ok(None);
        };
        if projection.status != from {
            return Ok(None);
        }
        projection.status = to;
        projection.status_changed_at = at;
        let updated = projection.clone();

        if !to.is_active() {
            let key = (updated.item.clone(), updated.subject.clone());
            inner.active_projections.remove(&key);
        }
        Ok(Some(updated))
    }

    async fn set_completed(
        &self,
        id: &ProjectionId,
        completed_at: Option<i64>,
    ) -> Result<Option<Projection>> {
        let mut inner = self.write()?;
        let Some(projection) = inner.projections.get_mut(id) else {
            return Ok(None);
        };
        projection.completed_at = completed_at;
        Ok(Some(projection.clone()))
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_event(&self, event: &AuditEvent) -> Result<()> {
        self.write()?.audit.push(event.clone());
        Ok(())
    }

    async fn events_for_entity(&self, entity: &EntityRef) -> Result<Vec<AuditEvent>> {
        let inner = self.read()?;
        Ok(inner
            .audit
            .iter()
            .filter(|e| &e.entity == entity)
            .cloned()
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// In-memory external directory
// ─────────────────────────────────────────────────────────────────────────

/// In-memory reference implementation of the external provider traits.
///
/// Tests and embedders seed base roles and entity records here; the kernel
/// only ever reads them.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: RwLock<DirectoryInner>,
}

#[derive(Default)]
struct DirectoryInner {
    base_roles: HashMap<(Subject, ContainerId), Role>,
    containers: HashMap<ContainerId, ()>,
    entities: HashMap<EntityRef, EntityInfo>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container.
    pub fn put_container(&self, container: ContainerId) {
        if let Ok(mut inner) = self.inner.write() {
            inner.containers.insert(container, ());
        }
    }

    /// Set (or replace) a subject's base role in a container.
    pub fn put_base_role(&self, subject: Subject, container: ContainerId, role: Role) {
        if let Ok(mut inner) = self.inner.write() {
            inner.containers.insert(container.clone(), ());
            inner.base_roles.insert((subject, container), role);
        }
    }

    /// Drop a subject's base role, as happens on container exit.
    pub fn clear_base_role(&self, subject: &Subject, container: &ContainerId) {
        if let Ok(mut inner) = self.inner.write() {
            inner
                .base_roles
                .remove(&(subject.clone(), container.clone()));
        }
    }

    /// Register (or replace) an entity record.
    pub fn put_entity(&self, info: EntityInfo) {
        if let Ok(mut inner) = self.inner.write() {
            inner.containers.insert(info.container.clone(), ());
            inner.entities.insert(info.entity.clone(), info);
        }
    }

    /// Update an entity's `updated_at`, as the authoritative owner does on
    /// every write.
    pub fn touch_entity(&self, entity: &EntityRef, updated_at: i64) {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(info) = inner.entities.get_mut(entity) {
                info.updated_at = updated_at;
            }
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, DirectoryInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl ContainerDirectory for MemoryDirectory {
    async fn base_role(
        &self,
        subject: &Subject,
        container: &ContainerId,
    ) -> Result<Option<Role>> {
        let inner = self.read()?;
        Ok(inner
            .base_roles
            .get(&(subject.clone(), container.clone()))
            .copied())
    }

    async fn container_exists(&self, container: &ContainerId) -> Result<bool> {
        Ok(self.read()?.containers.contains_key(container))
    }
}

#[async_trait]
impl EntityDirectory for MemoryDirectory {
    async fn entity_info(&self, entity: &EntityRef) -> Result<Option<EntityInfo>> {
        Ok(self.read()?.entities.get(entity).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::Role;

    fn group(container: &str, name: &str) -> GroupRecord {
        GroupRecord::new(ContainerId::new(container), name, 1_000)
    }

    #[tokio::test]
    async fn add_member_is_idempotent() {
        let store = MemoryStore::new();
        let g = group("c-1", "design");
        store.create_group(&g).await.unwrap();

        let user = UserId::new("u-1");
        let r1 = store.add_member(&g.id, &user, 1_000).await.unwrap();
        assert!(r1.is_inserted());

        let r2 = store.add_member(&g.id, &user, 2_000).await.unwrap();
        match r2 {
            InsertOutcome::AlreadyExists { existing } => assert_eq!(existing.added_at, 1_000),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_active_grant_returns_existing() {
        let store = MemoryStore::new();
        let grant = EntityGrant::new(
            EntityRef::task("t-1"),
            Subject::User(UserId::new("u-2")),
            Role::Editor,
            UserId::new("u-1"),
            1_000,
        );

        assert!(store.insert_grant(&grant).await.unwrap().is_inserted());

        let dup = EntityGrant {
            role: Role::Viewer,
            ..grant.clone()
        };
        match store.insert_grant(&dup).await.unwrap() {
            InsertOutcome::AlreadyExists { existing } => assert_eq!(existing.role, Role::Editor),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn revoke_then_recreate_succeeds() {
        let store = MemoryStore::new();
        let entity = EntityRef::task("t-1");
        let subject = Subject::User(UserId::new("u-2"));
        let grant = EntityGrant::new(
            entity.clone(),
            subject.clone(),
            Role::Viewer,
            UserId::new("u-1"),
            1_000,
        );

        store.insert_grant(&grant).await.unwrap();
        let revoked = store
            .revoke_grant(&entity, &subject, &UserId::new("u-1"), 2_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(revoked.revoked_at, Some(2_000));

        // Revoke is idempotent.
        assert!(store
            .revoke_grant(&entity, &subject, &UserId::new("u-1"), 3_000)
            .await
            .unwrap()
            .is_none());

        let regrant = EntityGrant::new(entity.clone(), subject.clone(), Role::Editor,
            UserId::new("u-1"), 4_000);
        assert!(store.insert_grant(&regrant).await.unwrap().is_inserted());

        // History keeps both rows.
        assert_eq!(store.grant_history_for_entity(&entity).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cascade_failpoint_rolls_back() {
        let store = MemoryStore::new();
        let container = ContainerId::new("c-1");
        let user = UserId::new("u-1");

        let mut group_ids = Vec::new();
        for name in ["a", "b", "c", "d", "e"] {
            let g = group("c-1", name);
            store.create_group(&g).await.unwrap();
            group_ids.push(g.id.clone());
        }
        // Member of 3 of the 5 groups.
        for gid in &group_ids[..3] {
            store.add_member(gid, &user, 1_000).await.unwrap();
        }

        store.set_cascade_failpoint(1);
        let err = store
            .remove_from_container_groups(&user, &container)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));

        // Rollback: all 3 memberships intact, never a partial count.
        assert_eq!(store.groups_of(&user, &container).await.unwrap().len(), 3);

        // Retry without the failpoint completes fully.
        let removed = store
            .remove_from_container_groups(&user, &container)
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert!(store.groups_of(&user, &container).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn projection_insert_and_transition() {
        let store = MemoryStore::new();
        let item = EntityRef::task("t-1");
        let user = UserId::new("u-1");
        let p = Projection::pending(item.clone(), user.clone(), None, true, true, 1_000);

        assert!(store.insert_projection(&p).await.unwrap().is_inserted());

        // Second active insert for the same pair is AlreadyExists.
        let dup = Projection::pending(item.clone(), user.clone(), None, false, false, 2_000);
        assert!(matches!(
            store.insert_projection(&dup).await.unwrap(),
            InsertOutcome::AlreadyExists { .. }
        ));

        // CAS transition.
        let accepted = store
            .transition_status(&p.id, ProjectionStatus::Pending, ProjectionStatus::Accepted, 3_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.status, ProjectionStatus::Accepted);

        // Stale CAS observes None.
        assert!(store
            .transition_status(&p.id, ProjectionStatus::Pending, ProjectionStatus::Declined, 4_000)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn terminal_projection_frees_the_active_slot() {
        let store = MemoryStore::new();
        let item = EntityRef::task("t-1");
        let user = UserId::new("u-1");
        let p = Projection::pending(item.clone(), user.clone(), None, false, true, 1_000);

        store.insert_projection(&p).await.unwrap();
        store
            .transition_status(&p.id, ProjectionStatus::Pending, ProjectionStatus::Declined, 2_000)
            .await
            .unwrap()
            .unwrap();

        // A fresh pending row (re-invite) can now be inserted; the declined
        // row is retained.
        let fresh = Projection::pending(item.clone(), user.clone(), None, false, true, 3_000);
        assert!(store.insert_projection(&fresh).await.unwrap().is_inserted());
        assert_eq!(
            store
                .projections_for_item_and_subject(&item, &user)
                .await
                .unwrap()
                .len(),
            2
        );
    }
}
