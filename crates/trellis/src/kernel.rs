//! The Kernel: unified API for the Trellis sharing system.
//!
//! The Kernel brings together the stores, the resolver, and the
//! distribution service into a cohesive interface for sharing surfaces.
//! Every operation authorizes the acting user through a fresh resolve —
//! nothing is cached, so a revocation is visible on the very next call —
//! and every permission-affecting operation emits one audit event.

use std::sync::Arc;

use tracing::warn;

use trellis_core::{
    AuditAction, AuditEvent, ContainerId, EntityGrant, EntityRef, GroupId, GroupRecord,
    Membership, Permission, Projection, ProjectionId, Role, Subject, UserId,
};
use trellis_perms::{CreatorRights, Resolver};
use trellis_share::{
    decide_edit, resolve_view, DistributionOptions, DistributionReport, DistributionService,
    EditDecision, ProjectionLifecycle, SharedItemView,
};
use trellis_store::{
    AuditStore, ContainerDirectory, EntityDirectory, GrantStore, InsertOutcome, MembershipStore,
    ProjectionStore, Store,
};

use crate::config::KernelConfig;
use crate::error::{KernelError, Result};

/// The main Kernel struct.
///
/// Provides a unified API for:
/// - Container-scoped groups and their memberships
/// - Explicit entity grants (create, revoke, query)
/// - Creator rights (inspect, revoke)
/// - Permission resolution
/// - Distribution and the projection lifecycle
pub struct Kernel<S, D> {
    /// The storage backend.
    store: Arc<S>,
    /// The external membership and entity registries (read-only).
    directory: Arc<D>,
    /// Configuration.
    config: KernelConfig,
}

impl<S, D> Kernel<S, D>
where
    S: Store,
    D: ContainerDirectory + EntityDirectory,
{
    /// Create a new kernel instance.
    pub fn new(store: S, directory: D, config: KernelConfig) -> Self {
        Self {
            store: Arc::new(store),
            directory: Arc::new(directory),
            config,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the external directory reference.
    pub fn directory(&self) -> &D {
        &self.directory
    }

    fn resolver(&self) -> Resolver<'_, S, D> {
        Resolver::new(&self.store, &self.directory)
    }

    fn distribution(&self) -> DistributionService<'_, S, D> {
        DistributionService::new(&self.store, &self.directory)
    }

    fn lifecycle(&self) -> ProjectionLifecycle<'_, S, D> {
        ProjectionLifecycle::new(&self.store, &self.directory)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Group Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a group in a container. Requires the `Owner` base role there.
    pub async fn create_group(
        &self,
        actor: &UserId,
        container: &ContainerId,
        name: &str,
    ) -> Result<GroupRecord> {
        if !self.directory.container_exists(container).await? {
            return Err(KernelError::NotFound(format!("container {container}")));
        }
        self.require_container_owner(actor, container).await?;

        let group = GroupRecord::new(container.clone(), name, now_millis());
        match self.store.create_group(&group).await? {
            InsertOutcome::Inserted => Ok(group),
            // Freshly minted ids do not collide; treat as backend noise.
            InsertOutcome::AlreadyExists { existing } => Ok(existing),
        }
    }

    /// Add a user to a group. The user must already hold a base role in the
    /// group's container; the actor must own that container.
    pub async fn add_member(
        &self,
        actor: &UserId,
        group: &GroupId,
        user: &UserId,
    ) -> Result<Membership> {
        let record = self
            .store
            .get_group(group)
            .await?
            .ok_or_else(|| KernelError::NotFound(format!("group {group}")))?;
        self.require_container_owner(actor, &record.container).await?;

        let base = self
            .directory
            .base_role(&Subject::User(user.clone()), &record.container)
            .await?;
        if base.is_none() {
            return Err(KernelError::BaseRoleRequired {
                user: user.clone(),
                container: record.container,
            });
        }

        let at = now_millis();
        match self.store.add_member(group, user, at).await? {
            InsertOutcome::Inserted => Ok(Membership {
                group: group.clone(),
                user: user.clone(),
                added_at: at,
            }),
            InsertOutcome::AlreadyExists { existing } => Ok(existing),
        }
    }

    /// Remove a user from a group. Requires owning the group's container.
    pub async fn remove_member(&self, actor: &UserId, group: &GroupId, user: &UserId) -> Result<bool> {
        let record = self
            .store
            .get_group(group)
            .await?
            .ok_or_else(|| KernelError::NotFound(format!("group {group}")))?;
        self.require_container_owner(actor, &record.container).await?;
        Ok(self.store.remove_member(group, user).await?)
    }

    /// Current members of a group.
    pub async fn members_of(&self, group: &GroupId) -> Result<Vec<UserId>> {
        Ok(self.store.members_of(group).await?)
    }

    /// The groups a user belongs to within a container.
    pub async fn groups_of(&self, user: &UserId, container: &ContainerId) -> Result<Vec<GroupId>> {
        Ok(self.store.groups_of(user, container).await?)
    }

    /// The groups of a container.
    pub async fn groups_in_container(&self, container: &ContainerId) -> Result<Vec<GroupRecord>> {
        Ok(self.store.groups_in_container(container).await?)
    }

    /// React to a user exiting a container: remove them from every group of
    /// that container as one atomic unit. The external registry has already
    /// dropped their base role; already-issued projections are untouched.
    ///
    /// Returns the number of memberships removed.
    pub async fn handle_container_exit(
        &self,
        user: &UserId,
        container: &ContainerId,
    ) -> Result<usize> {
        Ok(self
            .store
            .remove_from_container_groups(user, container)
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Grant Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an explicit grant. The actor must hold `can_manage` on the
    /// entity; an existing active grant for the tuple is a conflict — the
    /// caller revokes it first to change the role.
    pub async fn create_grant(
        &self,
        actor: &UserId,
        entity: &EntityRef,
        subject: Subject,
        role: Role,
    ) -> Result<EntityGrant> {
        if matches!(subject, Subject::Team(_)) {
            return Err(KernelError::Validation(
                "team subjects are reserved and cannot be granted to yet".to_string(),
            ));
        }

        let info = self
            .directory
            .entity_info(entity)
            .await?
            .ok_or_else(|| KernelError::NotFound(format!("entity {entity}")))?;

        let actor_perm = self
            .resolver()
            .resolve_in_container(&Subject::User(actor.clone()), &info.container, entity)
            .await?;
        if !actor_perm.can_manage {
            return Err(KernelError::Authorization(
                "you lack permission to grant access here".to_string(),
            ));
        }

        if let Subject::Group(group) = &subject {
            let record = self
                .store
                .get_group(group)
                .await?
                .ok_or_else(|| KernelError::NotFound(format!("group {group}")))?;
            if record.container != info.container {
                return Err(KernelError::GroupOutsideContainer {
                    group: group.clone(),
                    container: info.container,
                });
            }
        }

        let at = now_millis();
        let grant = EntityGrant::new(entity.clone(), subject, role, actor.clone(), at);
        match self.store.insert_grant(&grant).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::AlreadyExists { existing } => {
                return Err(KernelError::DuplicateGrant { existing });
            }
        }

        self.audit(
            actor,
            AuditAction::GrantCreated,
            entity,
            Some(grant.subject.clone()),
            None,
            self.snapshot(&grant),
            at,
        )
        .await;
        Ok(grant)
    }

    /// Revoke the active grant for a tuple. Idempotent: revoking an absent
    /// grant is a no-op returning `None`.
    pub async fn revoke_grant(
        &self,
        actor: &UserId,
        entity: &EntityRef,
        subject: &Subject,
    ) -> Result<Option<EntityGrant>> {
        let info = self
            .directory
            .entity_info(entity)
            .await?
            .ok_or_else(|| KernelError::NotFound(format!("entity {entity}")))?;

        let actor_perm = self
            .resolver()
            .resolve_in_container(&Subject::User(actor.clone()), &info.container, entity)
            .await?;
        if !actor_perm.can_manage {
            return Err(KernelError::Authorization(
                "you lack permission to revoke access here".to_string(),
            ));
        }

        let at = now_millis();
        let Some(revoked) = self.store.revoke_grant(entity, subject, actor, at).await? else {
            return Ok(None);
        };

        let before = EntityGrant {
            revoked_by: None,
            revoked_at: None,
            ..revoked.clone()
        };
        self.audit(
            actor,
            AuditAction::GrantRevoked,
            entity,
            Some(revoked.subject.clone()),
            self.snapshot(&before),
            self.snapshot(&revoked),
            at,
        )
        .await;
        Ok(Some(revoked))
    }

    /// The active grants held by a subject ("what can I access").
    pub async fn grants_for_subject(&self, subject: &Subject) -> Result<Vec<EntityGrant>> {
        Ok(self.store.active_grants_for_subject(subject).await?)
    }

    /// The active grants on an entity ("who can access this").
    pub async fn grants_on_entity(&self, entity: &EntityRef) -> Result<Vec<EntityGrant>> {
        Ok(self.store.active_grants_for_entity(entity).await?)
    }

    /// Every grant row ever written for an entity, revoked rows included.
    pub async fn grant_history(&self, entity: &EntityRef) -> Result<Vec<EntityGrant>> {
        Ok(self.store.grant_history_for_entity(entity).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Creator Rights
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether `user` currently holds creator rights on `entity`.
    pub async fn has_creator_rights(&self, entity: &EntityRef, user: &UserId) -> Result<bool> {
        Ok(CreatorRights::new(&*self.store, &*self.directory)
            .has_creator_rights(entity, user)
            .await?)
    }

    /// Permanently revoke a creator's implicit editor right. The actor must
    /// hold the `Owner` base role in the entity's container.
    pub async fn revoke_creator_rights(
        &self,
        actor: &UserId,
        entity: &EntityRef,
        user: &UserId,
    ) -> Result<()> {
        let at = now_millis();
        let revocation = CreatorRights::new(&*self.store, &*self.directory)
            .revoke(entity, user, actor, at)
            .await?;

        // Only a fresh revocation gets an event; replays return the
        // original row and change nothing.
        if revocation.revoked_at == at {
            self.audit(
                actor,
                AuditAction::CreatorRightsRevoked,
                entity,
                Some(Subject::User(user.clone())),
                None,
                self.snapshot(&revocation),
                at,
            )
            .await;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permission Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve a subject's effective permission on an entity. Recomputed on
    /// every call; never cached across revocations.
    pub async fn resolve(&self, subject: &Subject, entity: &EntityRef) -> Result<Permission> {
        Ok(self.resolver().resolve(subject, entity).await?)
    }

    /// Resolve within an explicitly named container.
    pub async fn resolve_in_container(
        &self,
        subject: &Subject,
        container: &ContainerId,
        entity: &EntityRef,
    ) -> Result<Permission> {
        Ok(self
            .resolver()
            .resolve_in_container(subject, container, entity)
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Distribution & Projections
    // ─────────────────────────────────────────────────────────────────────────

    /// Distribute an item to the current members of a group.
    pub async fn distribute(
        &self,
        actor: &UserId,
        item: &EntityRef,
        group: &GroupId,
        options: DistributionOptions,
    ) -> Result<DistributionReport> {
        Ok(self
            .distribution()
            .distribute(actor, item, group, options, now_millis())
            .await?)
    }

    /// Explicitly re-invite one subject, superseding a declined or revoked
    /// projection with a fresh pending one.
    pub async fn re_invite(
        &self,
        actor: &UserId,
        item: &EntityRef,
        subject: &UserId,
        options: DistributionOptions,
    ) -> Result<Projection> {
        Ok(self
            .distribution()
            .re_invite(actor, item, subject, options, now_millis())
            .await?)
    }

    /// Accept or decline a pending projection.
    pub async fn respond_to_projection(
        &self,
        user: &UserId,
        id: &ProjectionId,
        accept: bool,
    ) -> Result<Projection> {
        Ok(self
            .lifecycle()
            .respond(user, id, accept, now_millis())
            .await?)
    }

    /// Revoke an accepted projection. Requires `can_manage` on its item.
    pub async fn revoke_projection(&self, actor: &UserId, id: &ProjectionId) -> Result<Projection> {
        Ok(self.lifecycle().revoke(actor, id, now_millis()).await?)
    }

    /// Set or clear the viewer's own completion mark on a projection.
    pub async fn set_projection_completed(
        &self,
        user: &UserId,
        id: &ProjectionId,
        completed: bool,
    ) -> Result<Projection> {
        Ok(self
            .lifecycle()
            .set_completed(user, id, completed, now_millis())
            .await?)
    }

    /// Every projection targeting a user, any status.
    pub async fn projections_for_user(&self, user: &UserId) -> Result<Vec<Projection>> {
        Ok(self.store.projections_for_subject(user).await?)
    }

    /// Render a projection for its target: shared fields resolved from the
    /// authoritative record, per-viewer state from the projection row.
    pub async fn shared_item_view(
        &self,
        user: &UserId,
        id: &ProjectionId,
    ) -> Result<SharedItemView> {
        let projection = self
            .store
            .get_projection(id)
            .await?
            .ok_or_else(|| KernelError::NotFound(format!("projection {id}")))?;
        if &projection.subject != user {
            return Err(KernelError::Authorization(
                "this projection belongs to another subject".to_string(),
            ));
        }
        if !projection.status.is_active() {
            return Err(KernelError::Authorization(
                "this item is no longer shared with you".to_string(),
            ));
        }

        let info = self
            .directory
            .entity_info(&projection.item)
            .await?
            .ok_or_else(|| KernelError::NotFound(format!("entity {}", projection.item)))?;
        Ok(resolve_view(&info, projection))
    }

    /// Decide a concurrent edit of the shared source by last-writer-wins.
    ///
    /// Editing is open to anyone whose resolved permission allows it, and
    /// to viewers holding an accepted projection with `can_edit`. The edit
    /// itself is applied by the authoritative owner; this kernel only
    /// arbitrates.
    pub async fn decide_source_edit(
        &self,
        actor: &UserId,
        item: &EntityRef,
        edit_at: i64,
    ) -> Result<EditDecision> {
        let info = self
            .directory
            .entity_info(item)
            .await?
            .ok_or_else(|| KernelError::NotFound(format!("entity {item}")))?;

        let perm = self
            .resolver()
            .resolve_in_container(&Subject::User(actor.clone()), &info.container, item)
            .await?;
        let via_projection = if perm.can_edit {
            false
        } else {
            self.store
                .projections_for_item_and_subject(item, actor)
                .await?
                .iter()
                .any(|p| {
                    p.status == trellis_core::ProjectionStatus::Accepted && p.can_edit
                })
        };
        if !perm.can_edit && !via_projection {
            return Err(KernelError::Authorization(
                "you cannot edit this item".to_string(),
            ));
        }

        Ok(decide_edit(info.updated_at, edit_at))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit
    // ─────────────────────────────────────────────────────────────────────────

    /// The audit trail for an entity, oldest first.
    pub async fn audit_trail(&self, entity: &EntityRef) -> Result<Vec<AuditEvent>> {
        Ok(self.store.events_for_entity(entity).await?)
    }

    async fn require_container_owner(&self, actor: &UserId, container: &ContainerId) -> Result<()> {
        let role = self
            .directory
            .base_role(&Subject::User(actor.clone()), container)
            .await?;
        if role != Some(Role::Owner) {
            return Err(KernelError::Authorization(format!(
                "managing groups requires the owner role in container {container}"
            )));
        }
        Ok(())
    }

    fn snapshot<T: serde::Serialize>(&self, value: &T) -> Option<String> {
        if !self.config.audit_snapshots {
            return None;
        }
        serde_json::to_string(value).ok()
    }

    #[allow(clippy::too_many_arguments)]
    async fn audit(
        &self,
        actor: &UserId,
        action: AuditAction,
        entity: &EntityRef,
        subject: Option<Subject>,
        before: Option<String>,
        after: Option<String>,
        at: i64,
    ) {
        let event = AuditEvent::new(
            actor.clone(),
            action,
            entity.clone(),
            subject,
            before,
            after,
            at,
        );
        if let Err(e) = self.store.append_event(&event).await {
            warn!(action = action.as_str(), error = %e, "audit append failed");
        }
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{EntityInfo, SharedFields};
    use trellis_store::{MemoryDirectory, MemoryStore};

    fn kernel() -> Kernel<MemoryStore, MemoryDirectory> {
        let directory = MemoryDirectory::new();
        directory.put_base_role(
            Subject::User(UserId::new("u-owner")),
            ContainerId::new("c-1"),
            Role::Owner,
        );
        directory.put_base_role(
            Subject::User(UserId::new("u-viewer")),
            ContainerId::new("c-1"),
            Role::Viewer,
        );
        directory.put_entity(EntityInfo {
            entity: EntityRef::task("t-1"),
            container: ContainerId::new("c-1"),
            created_by: UserId::new("u-owner"),
            updated_at: 1_000,
            shared: SharedFields::default(),
        });
        Kernel::new(MemoryStore::new(), directory, KernelConfig::default())
    }

    #[tokio::test]
    async fn group_management_requires_the_container_owner() {
        let kernel = kernel();
        let container = ContainerId::new("c-1");

        let err = kernel
            .create_group(&UserId::new("u-viewer"), &container, "design")
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::Authorization(_)));

        let group = kernel
            .create_group(&UserId::new("u-owner"), &container, "design")
            .await
            .unwrap();
        assert_eq!(group.name, "design");
    }

    #[tokio::test]
    async fn joining_requires_a_base_role() {
        let kernel = kernel();
        let owner = UserId::new("u-owner");
        let group = kernel
            .create_group(&owner, &ContainerId::new("c-1"), "design")
            .await
            .unwrap();

        let err = kernel
            .add_member(&owner, &group.id, &UserId::new("u-stranger"))
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::BaseRoleRequired { .. }));

        kernel
            .add_member(&owner, &group.id, &UserId::new("u-viewer"))
            .await
            .unwrap();
        assert_eq!(kernel.members_of(&group.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_grant_is_a_conflict_with_the_existing_row() {
        let kernel = kernel();
        let owner = UserId::new("u-owner");
        let entity = EntityRef::task("t-1");
        let subject = Subject::User(UserId::new("u-viewer"));

        kernel
            .create_grant(&owner, &entity, subject.clone(), Role::Viewer)
            .await
            .unwrap();

        let err = kernel
            .create_grant(&owner, &entity, subject.clone(), Role::Editor)
            .await
            .unwrap_err();
        match err {
            KernelError::DuplicateGrant { existing } => assert_eq!(existing.role, Role::Viewer),
            other => panic!("expected DuplicateGrant, got {other:?}"),
        }

        // Revoke-then-recreate is the role-change path.
        kernel.revoke_grant(&owner, &entity, &subject).await.unwrap();
        let grant = kernel
            .create_grant(&owner, &entity, subject, Role::Editor)
            .await
            .unwrap();
        assert_eq!(grant.role, Role::Editor);
    }

    #[tokio::test]
    async fn team_grants_are_reserved() {
        let kernel = kernel();
        let err = kernel
            .create_grant(
                &UserId::new("u-owner"),
                &EntityRef::task("t-1"),
                Subject::Team(trellis_core::TeamId::new("team-1")),
                Role::Viewer,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::Validation(_)));
    }

    #[tokio::test]
    async fn grant_and_revoke_emit_audit_events() {
        let kernel = kernel();
        let owner = UserId::new("u-owner");
        let entity = EntityRef::task("t-1");
        let subject = Subject::User(UserId::new("u-viewer"));

        kernel
            .create_grant(&owner, &entity, subject.clone(), Role::Editor)
            .await
            .unwrap();
        kernel.revoke_grant(&owner, &entity, &subject).await.unwrap();
        // Idempotent revoke emits nothing further.
        kernel.revoke_grant(&owner, &entity, &subject).await.unwrap();

        let trail = kernel.audit_trail(&entity).await.unwrap();
        let actions: Vec<_> = trail.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::GrantCreated, AuditAction::GrantRevoked]
        );
        assert!(trail.iter().all(|e| e.actor == owner));
    }
}
