//! The distribution service and projection lifecycle.
//!
//! Distribution is a diff against already-issued projections: members who
//! ever received one (any status) are skipped, so re-running a distribution
//! is idempotent and never resets a declined or revoked decision. Partial
//! failures are reported per member; projections created before a failure
//! point remain valid.

use tracing::warn;

use trellis_core::{
    AuditAction, AuditEvent, EntityRef, GroupId, Permission, Projection, ProjectionId,
    ProjectionStatus, Subject, UserId, ValidationError,
};
use trellis_perms::Resolver;
use trellis_store::{
    AuditStore, ContainerDirectory, EntityDirectory, InsertOutcome, MembershipStore,
    ProjectionStore, Store,
};

use crate::error::{Result, ShareError};

/// Requested per-viewer capabilities for a distribution run.
///
/// The effective flags on each created projection are clamped by the
/// distributing actor's own resolved permission: a projection never grants
/// more than its distributor holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionOptions {
    /// Whether recipients may edit the shared source.
    pub can_edit: bool,
    /// Whether recipients may mark their own copy complete.
    pub can_complete: bool,
}

impl Default for DistributionOptions {
    fn default() -> Self {
        Self {
            can_edit: false,
            can_complete: true,
        }
    }
}

impl DistributionOptions {
    /// Clamp the requested flags by the distributor's own permission.
    fn clamp(self, distributor: &Permission) -> Self {
        Self {
            can_edit: self.can_edit && distributor.can_edit,
            can_complete: self.can_complete && distributor.can_view,
        }
    }
}

/// Why a member was skipped during distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The member already has a projection for this item, in the given
    /// status. Declined and revoked projections are never silently reset.
    ExistingProjection(ProjectionStatus),
}

/// Per-member outcome of a distribution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOutcome {
    Created {
        user: UserId,
        projection_id: ProjectionId,
    },
    Skipped {
        user: UserId,
        reason: SkipReason,
    },
    /// The member's projection could not be created. Other members are
    /// unaffected: there is no global rollback.
    Failed {
        user: UserId,
        message: String,
    },
}

/// The full result of one distribution run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionReport {
    pub outcomes: Vec<MemberOutcome>,
}

impl DistributionReport {
    pub fn created(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MemberOutcome::Created { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MemberOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MemberOutcome::Failed { .. }))
            .count()
    }
}

/// Creates and re-issues projections for group members.
pub struct DistributionService<'a, S, D> {
    store: &'a S,
    directory: &'a D,
}

impl<'a, S, D> DistributionService<'a, S, D>
where
    S: Store,
    D: ContainerDirectory + EntityDirectory,
{
    pub fn new(store: &'a S, directory: &'a D) -> Self {
        Self { store, directory }
    }

    fn resolver(&self) -> Resolver<'a, S, D> {
        Resolver::new(self.store, self.directory)
    }

    /// Distribute `item` to the current members of `group`.
    ///
    /// The actor must hold `can_manage` on the item. Members with an
    /// existing projection (any status) are skipped; a concurrent duplicate
    /// insert loses the race and is reported as skipped, never as an error.
    pub async fn distribute(
        &self,
        actor: &UserId,
        item: &EntityRef,
        group: &GroupId,
        options: DistributionOptions,
        at: i64,
    ) -> Result<DistributionReport> {
        let (info, clamped) = self.prepare(actor, item, options).await?;

        let group_record = self
            .store
            .get_group(group)
            .await?
            .ok_or_else(|| ShareError::GroupNotFound(group.clone()))?;
        if group_record.container != info.container {
            return Err(ShareError::GroupOutsideContainer {
                group: group.clone(),
            });
        }

        let members = self.store.members_of(group).await?;

        // Diff against every projection ever issued for this item: any
        // status, including declined and revoked, blocks re-issuing.
        let existing = self.store.projections_for_item(item).await?;

        let mut report = DistributionReport::default();
        for member in members {
            if let Some(prior) = existing.iter().rev().find(|p| p.subject == member) {
                report.outcomes.push(MemberOutcome::Skipped {
                    user: member,
                    reason: SkipReason::ExistingProjection(prior.status),
                });
                continue;
            }

            let projection = Projection::pending(
                item.clone(),
                member.clone(),
                Some(group.clone()),
                clamped.can_edit,
                clamped.can_complete,
                at,
            );
            match self.store.insert_projection(&projection).await {
                Ok(InsertOutcome::Inserted) => {
                    self.audit(actor, AuditAction::ProjectionCreated, &projection, None, at)
                        .await;
                    report.outcomes.push(MemberOutcome::Created {
                        user: member,
                        projection_id: projection.id,
                    });
                }
                Ok(InsertOutcome::AlreadyExists { existing }) => {
                    // Lost a race to a concurrent distribution run.
                    report.outcomes.push(MemberOutcome::Skipped {
                        user: member,
                        reason: SkipReason::ExistingProjection(existing.status),
                    });
                }
                Err(e) => {
                    report.outcomes.push(MemberOutcome::Failed {
                        user: member,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Explicitly re-invite one subject to an item, superseding a declined
    /// or revoked projection with a fresh pending row. The terminal row is
    /// retained for audit.
    pub async fn re_invite(
        &self,
        actor: &UserId,
        item: &EntityRef,
        subject: &UserId,
        options: DistributionOptions,
        at: i64,
    ) -> Result<Projection> {
        let (_, clamped) = self.prepare(actor, item, options).await?;

        let prior = self
            .store
            .projections_for_item_and_subject(item, subject)
            .await?;
        if let Some(active) = prior.iter().find(|p| p.status.is_active()) {
            return Err(ShareError::ProjectionAlreadyActive {
                existing: Box::new(active.clone()),
            });
        }

        let projection = Projection::pending(
            item.clone(),
            subject.clone(),
            None,
            clamped.can_edit,
            clamped.can_complete,
            at,
        );
        match self.store.insert_projection(&projection).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::AlreadyExists { existing } => {
                return Err(ShareError::ProjectionAlreadyActive {
                    existing: Box::new(existing),
                });
            }
        }

        let action = if prior.is_empty() {
            AuditAction::ProjectionCreated
        } else {
            AuditAction::ProjectionReinvited
        };
        self.audit(actor, action, &projection, None, at).await;
        Ok(projection)
    }

    /// Shared preamble: the item must exist and be distributable, and the
    /// actor must hold `can_manage` on it. Returns the entity info and the
    /// clamped options.
    async fn prepare(
        &self,
        actor: &UserId,
        item: &EntityRef,
        options: DistributionOptions,
    ) -> Result<(trellis_core::EntityInfo, DistributionOptions)> {
        let info = self
            .directory
            .entity_info(item)
            .await?
            .ok_or_else(|| ShareError::EntityNotFound(item.clone()))?;
        if !item.kind.is_distributable() {
            return Err(ShareError::Validation(ValidationError::NotDistributable(
                item.kind.as_str().to_string(),
            )));
        }

        let actor_perm = self
            .resolver()
            .resolve_in_container(&Subject::User(actor.clone()), &info.container, item)
            .await?;
        if !actor_perm.can_manage {
            return Err(ShareError::NotAuthorized(
                "distributing an item requires manage rights on it".to_string(),
            ));
        }

        Ok((info, options.clamp(&actor_perm)))
    }

    async fn audit(
        &self,
        actor: &UserId,
        action: AuditAction,
        projection: &Projection,
        before: Option<String>,
        at: i64,
    ) {
        let after = serde_json::to_string(projection).ok();
        let event = AuditEvent::new(
            actor.clone(),
            action,
            projection.item.clone(),
            Some(Subject::User(projection.subject.clone())),
            before,
            after,
            at,
        );
        if let Err(e) = self.store.append_event(&event).await {
            warn!(action = action.as_str(), error = %e, "audit append failed");
        }
    }
}

/// Drives the projection state machine and per-viewer fields.
pub struct ProjectionLifecycle<'a, S, D> {
    store: &'a S,
    directory: &'a D,
}

impl<'a, S, D> ProjectionLifecycle<'a, S, D>
where
    S: Store,
    D: ContainerDirectory + EntityDirectory,
{
    pub fn new(store: &'a S, directory: &'a D) -> Self {
        Self { store, directory }
    }

    /// Accept or decline a pending projection. Only its target subject may
    /// respond.
    pub async fn respond(
        &self,
        user: &UserId,
        id: &ProjectionId,
        accept: bool,
        at: i64,
    ) -> Result<Projection> {
        let projection = self.fetch(id).await?;
        if &projection.subject != user {
            return Err(ShareError::NotAuthorized(
                "only the projection's target may respond to it".to_string(),
            ));
        }

        let to = if accept {
            ProjectionStatus::Accepted
        } else {
            ProjectionStatus::Declined
        };
        let updated = self
            .transition(&projection, ProjectionStatus::Pending, to, at)
            .await?;

        let action = if accept {
            AuditAction::ProjectionAccepted
        } else {
            AuditAction::ProjectionDeclined
        };
        self.audit(user, action, &projection, &updated, at).await;
        Ok(updated)
    }

    /// Revoke an accepted projection. The actor must hold `can_manage` on
    /// the source item.
    pub async fn revoke(&self, actor: &UserId, id: &ProjectionId, at: i64) -> Result<Projection> {
        let projection = self.fetch(id).await?;

        let actor_perm = Resolver::new(self.store, self.directory)
            .resolve(&Subject::User(actor.clone()), &projection.item)
            .await?;
        if !actor_perm.can_manage {
            return Err(ShareError::NotAuthorized(
                "revoking a projection requires manage rights on its item".to_string(),
            ));
        }

        let updated = self
            .transition(&projection, ProjectionStatus::Accepted, ProjectionStatus::Revoked, at)
            .await?;
        self.audit(actor, AuditAction::ProjectionRevoked, &projection, &updated, at)
            .await;
        Ok(updated)
    }

    /// Set or clear the viewer's own completion mark. Stored on the
    /// projection only, never on the shared source.
    pub async fn set_completed(
        &self,
        user: &UserId,
        id: &ProjectionId,
        completed: bool,
        at: i64,
    ) -> Result<Projection> {
        let projection = self.fetch(id).await?;
        if &projection.subject != user {
            return Err(ShareError::NotAuthorized(
                "only the projection's target may complete it".to_string(),
            ));
        }
        if !projection.can_complete {
            return Err(ShareError::NotAuthorized(
                "this projection does not allow completion".to_string(),
            ));
        }
        if projection.status != ProjectionStatus::Accepted {
            return Err(ShareError::Validation(ValidationError::IllegalTransition {
                from: projection.status.as_str().to_string(),
                to: "completed".to_string(),
            }));
        }

        self.store
            .set_completed(id, completed.then_some(at))
            .await?
            .ok_or_else(|| ShareError::ProjectionNotFound(id.clone()))
    }

    async fn fetch(&self, id: &ProjectionId) -> Result<Projection> {
        self.store
            .get_projection(id)
            .await?
            .ok_or_else(|| ShareError::ProjectionNotFound(id.clone()))
    }

    /// Validate and apply a transition with compare-and-set semantics. A
    /// concurrent change between read and write surfaces as an illegal
    /// transition from the now-current status.
    async fn transition(
        &self,
        projection: &Projection,
        from: ProjectionStatus,
        to: ProjectionStatus,
        at: i64,
    ) -> Result<Projection> {
        if projection.status != from || !from.can_transition_to(to) {
            return Err(ShareError::Validation(ValidationError::IllegalTransition {
                from: projection.status.as_str().to_string(),
                to: to.as_str().to_string(),
            }));
        }

        match self
            .store
            .transition_status(&projection.id, from, to, at)
            .await?
        {
            Some(updated) => Ok(updated),
            None => {
                let current = self.fetch(&projection.id).await?;
                Err(ShareError::Validation(ValidationError::IllegalTransition {
                    from: current.status.as_str().to_string(),
                    to: to.as_str().to_string(),
                }))
            }
        }
    }

    async fn audit(
        &self,
        actor: &UserId,
        action: AuditAction,
        before: &Projection,
        after: &Projection,
        at: i64,
    ) {
        let event = AuditEvent::new(
            actor.clone(),
            action,
            after.item.clone(),
            Some(Subject::User(after.subject.clone())),
            serde_json::to_string(before).ok(),
            serde_json::to_string(after).ok(),
            at,
        );
        if let Err(e) = self.store.append_event(&event).await {
            warn!(action = action.as_str(), error = %e, "audit append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{ContainerId, EntityGrant, EntityInfo, GroupRecord, Role, SharedFields};
    use trellis_store::{GrantStore, MembershipStore, MemoryDirectory, MemoryStore, ProjectionStore};

    struct Fixture {
        store: MemoryStore,
        directory: MemoryDirectory,
        container: ContainerId,
        item: EntityRef,
        owner: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            let store = MemoryStore::new();
            let directory = MemoryDirectory::new();
            let container = ContainerId::new("c-1");
            let owner = UserId::new("u-owner");
            let item = EntityRef::task("t-1");

            directory.put_entity(EntityInfo {
                entity: item.clone(),
                container: container.clone(),
                created_by: owner.clone(),
                updated_at: 1_000,
                shared: SharedFields {
                    title: "release checklist".to_string(),
                    description: None,
                    scheduled_at: None,
                },
            });
            directory.put_base_role(
                Subject::User(owner.clone()),
                container.clone(),
                Role::Owner,
            );

            Self {
                store,
                directory,
                container,
                item,
                owner,
            }
        }

        async fn group_with_members(&self, names: &[&str]) -> GroupId {
            let group = GroupRecord::new(self.container.clone(), "team", 1_000);
            self.store.create_group(&group).await.unwrap();
            for name in names {
                let user = UserId::new(*name);
                self.directory.put_base_role(
                    Subject::User(user.clone()),
                    self.container.clone(),
                    Role::Viewer,
                );
                self.store.add_member(&group.id, &user, 1_000).await.unwrap();
            }
            group.id
        }

        fn distribution(&self) -> DistributionService<'_, MemoryStore, MemoryDirectory> {
            DistributionService::new(&self.store, &self.directory)
        }

        fn lifecycle(&self) -> ProjectionLifecycle<'_, MemoryStore, MemoryDirectory> {
            ProjectionLifecycle::new(&self.store, &self.directory)
        }
    }

    #[tokio::test]
    async fn distribute_creates_pending_projections() {
        let fx = Fixture::new();
        let group = fx.group_with_members(&["u-a", "u-b", "u-c"]).await;

        let report = fx
            .distribution()
            .distribute(&fx.owner, &fx.item, &group, DistributionOptions::default(), 2_000)
            .await
            .unwrap();

        assert_eq!(report.created(), 3);
        assert_eq!(report.skipped(), 0);
        let rows = fx.store.projections_for_item(&fx.item).await.unwrap();
        assert!(rows.iter().all(|p| p.status == ProjectionStatus::Pending));
        assert!(rows.iter().all(|p| p.source_group == Some(group.clone())));
    }

    #[tokio::test]
    async fn distribute_twice_is_idempotent() {
        let fx = Fixture::new();
        let group = fx.group_with_members(&["u-a", "u-b"]).await;
        let svc = fx.distribution();

        let opts = DistributionOptions::default();
        let first = svc
            .distribute(&fx.owner, &fx.item, &group, opts, 2_000)
            .await
            .unwrap();
        assert_eq!(first.created(), 2);

        let second = svc
            .distribute(&fx.owner, &fx.item, &group, opts, 3_000)
            .await
            .unwrap();
        assert_eq!(second.created(), 0);
        assert_eq!(second.skipped(), 2);
    }

    #[tokio::test]
    async fn distribute_requires_manage_rights() {
        let fx = Fixture::new();
        let group = fx.group_with_members(&["u-a"]).await;

        // u-a holds only the viewer base role.
        let err = fx
            .distribution()
            .distribute(
                &UserId::new("u-a"),
                &fx.item,
                &group,
                DistributionOptions::default(),
                2_000,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn distribute_rejects_structural_entities() {
        let fx = Fixture::new();
        let group = fx.group_with_members(&["u-a"]).await;

        let track = EntityRef::new(trellis_core::EntityKind::Track, "tr-1");
        fx.directory.put_entity(EntityInfo {
            entity: track.clone(),
            container: fx.container.clone(),
            created_by: fx.owner.clone(),
            updated_at: 1_000,
            shared: SharedFields::default(),
        });

        let err = fx
            .distribution()
            .distribute(&fx.owner, &track, &group, DistributionOptions::default(), 2_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShareError::Validation(ValidationError::NotDistributable(_))
        ));
    }

    #[tokio::test]
    async fn declined_members_are_skipped_not_reset() {
        // Scenario B: A accepts, B declines, C leaves the container. The
        // re-run skips A and B and creates nothing for C.
        let fx = Fixture::new();
        let group = fx.group_with_members(&["u-a", "u-b", "u-c"]).await;
        let svc = fx.distribution();
        let opts = DistributionOptions::default();

        svc.distribute(&fx.owner, &fx.item, &group, opts, 2_000)
            .await
            .unwrap();
        let rows = fx.store.projections_for_item(&fx.item).await.unwrap();
        let by_user = |u: &str| {
            rows.iter()
                .find(|p| p.subject == UserId::new(u))
                .unwrap()
                .clone()
        };

        let lifecycle = fx.lifecycle();
        lifecycle
            .respond(&UserId::new("u-a"), &by_user("u-a").id, true, 3_000)
            .await
            .unwrap();
        lifecycle
            .respond(&UserId::new("u-b"), &by_user("u-b").id, false, 3_000)
            .await
            .unwrap();

        // C leaves the container: cascade out of its groups.
        fx.store
            .remove_from_container_groups(&UserId::new("u-c"), &fx.container)
            .await
            .unwrap();
        // C's already-issued projection is untouched by the membership
        // change (non-retroactivity).
        assert_eq!(by_user("u-c").status, ProjectionStatus::Pending);

        let report = svc
            .distribute(&fx.owner, &fx.item, &group, opts, 4_000)
            .await
            .unwrap();
        assert_eq!(report.created(), 0);
        // A and B are skipped with their decisions intact; C is no longer
        // a member so no outcome mentions them.
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes.iter().all(|o| matches!(
            o,
            MemberOutcome::Skipped {
                reason: SkipReason::ExistingProjection(_),
                ..
            }
        )));
    }

    #[tokio::test]
    async fn flags_are_clamped_by_the_distributor() {
        let fx = Fixture::new();
        let group = fx.group_with_members(&["u-a"]).await;

        // u-mgr manages through an explicit owner grant but the item's
        // container only gives them a viewer base role, so the clamp uses
        // their full resolved permission (owner -> can_edit).
        let manager = UserId::new("u-mgr");
        fx.directory.put_base_role(
            Subject::User(manager.clone()),
            fx.container.clone(),
            Role::Viewer,
        );
        fx.store
            .insert_grant(&EntityGrant::new(
                fx.item.clone(),
                Subject::User(manager.clone()),
                Role::Owner,
                fx.owner.clone(),
                1_500,
            ))
            .await
            .unwrap();

        let report = fx
            .distribution()
            .distribute(
                &manager,
                &fx.item,
                &group,
                DistributionOptions {
                    can_edit: true,
                    can_complete: true,
                },
                2_000,
            )
            .await
            .unwrap();
        assert_eq!(report.created(), 1);

        let rows = fx.store.projections_for_item(&fx.item).await.unwrap();
        assert!(rows[0].can_edit && rows[0].can_complete);
    }

    #[tokio::test]
    async fn re_invite_supersedes_a_declined_projection() {
        let fx = Fixture::new();
        let group = fx.group_with_members(&["u-a"]).await;
        let svc = fx.distribution();
        let opts = DistributionOptions::default();

        svc.distribute(&fx.owner, &fx.item, &group, opts, 2_000)
            .await
            .unwrap();
        let rows = fx.store.projections_for_item(&fx.item).await.unwrap();
        fx.lifecycle()
            .respond(&UserId::new("u-a"), &rows[0].id, false, 3_000)
            .await
            .unwrap();

        // Redistribution skips the declined member...
        let rerun = svc
            .distribute(&fx.owner, &fx.item, &group, opts, 4_000)
            .await
            .unwrap();
        assert_eq!(rerun.created(), 0);

        // ...but an explicit re-invite issues a fresh pending row.
        let fresh = svc
            .re_invite(&fx.owner, &fx.item, &UserId::new("u-a"), opts, 5_000)
            .await
            .unwrap();
        assert_eq!(fresh.status, ProjectionStatus::Pending);

        let all = fx
            .store
            .projections_for_item_and_subject(&fx.item, &UserId::new("u-a"))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, ProjectionStatus::Declined);
    }

    #[tokio::test]
    async fn re_invite_rejects_an_active_projection() {
        let fx = Fixture::new();
        let group = fx.group_with_members(&["u-a"]).await;
        let svc = fx.distribution();
        let opts = DistributionOptions::default();

        svc.distribute(&fx.owner, &fx.item, &group, opts, 2_000)
            .await
            .unwrap();

        let err = svc
            .re_invite(&fx.owner, &fx.item, &UserId::new("u-a"), opts, 3_000)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::ProjectionAlreadyActive { .. }));
    }

    #[tokio::test]
    async fn respond_is_restricted_to_the_target() {
        let fx = Fixture::new();
        let group = fx.group_with_members(&["u-a"]).await;
        fx.distribution()
            .distribute(&fx.owner, &fx.item, &group, DistributionOptions::default(), 2_000)
            .await
            .unwrap();
        let rows = fx.store.projections_for_item(&fx.item).await.unwrap();

        let err = fx
            .lifecycle()
            .respond(&UserId::new("u-intruder"), &rows[0].id, true, 3_000)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn completion_lands_on_the_projection_only() {
        let fx = Fixture::new();
        let group = fx.group_with_members(&["u-a"]).await;
        fx.distribution()
            .distribute(&fx.owner, &fx.item, &group, DistributionOptions::default(), 2_000)
            .await
            .unwrap();
        let rows = fx.store.projections_for_item(&fx.item).await.unwrap();
        let user = UserId::new("u-a");
        let lifecycle = fx.lifecycle();

        // Completing before accepting is illegal.
        assert!(lifecycle
            .set_completed(&user, &rows[0].id, true, 3_000)
            .await
            .is_err());

        lifecycle.respond(&user, &rows[0].id, true, 3_000).await.unwrap();
        let done = lifecycle
            .set_completed(&user, &rows[0].id, true, 4_000)
            .await
            .unwrap();
        assert_eq!(done.completed_at, Some(4_000));

        // The authoritative record is untouched.
        let info = trellis_store::EntityDirectory::entity_info(&fx.directory, &fx.item)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.updated_at, 1_000);
    }

    #[tokio::test]
    async fn revoke_requires_manage_and_an_accepted_projection() {
        let fx = Fixture::new();
        let group = fx.group_with_members(&["u-a"]).await;
        fx.distribution()
            .distribute(&fx.owner, &fx.item, &group, DistributionOptions::default(), 2_000)
            .await
            .unwrap();
        let rows = fx.store.projections_for_item(&fx.item).await.unwrap();
        let lifecycle = fx.lifecycle();

        // Pending projections cannot be revoked.
        assert!(lifecycle.revoke(&fx.owner, &rows[0].id, 3_000).await.is_err());

        lifecycle
            .respond(&UserId::new("u-a"), &rows[0].id, true, 3_000)
            .await
            .unwrap();

        // Non-managers cannot revoke.
        let err = lifecycle
            .revoke(&UserId::new("u-a"), &rows[0].id, 4_000)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::NotAuthorized(_)));

        let revoked = lifecycle.revoke(&fx.owner, &rows[0].id, 5_000).await.unwrap();
        assert_eq!(revoked.status, ProjectionStatus::Revoked);
    }
}
