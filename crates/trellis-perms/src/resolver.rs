//! The permission resolver.
//!
//! Pure and deterministic: every call recomputes the effective permission
//! from the stores, so no caller ever observes permission state that
//! predates a revocation.

use tracing::error;

use trellis_core::{ContainerId, EntityRef, Permission, Role, Subject};
use trellis_store::{
    ContainerDirectory, CreatorRightsStore, EntityDirectory, GrantStore, MembershipStore,
};

use crate::error::{PermsError, Result};

/// Combine the three permission sources, taking the maximum.
///
/// `base == None` is the no-access floor: no other source can override it.
pub fn combine(base: Option<Role>, creator: Option<Role>, grant: Option<Role>) -> Option<Role> {
    let base = base?;
    Some(base.max_with(creator).max_with(grant))
}

/// Resolves effective permissions over the grant, membership and creator
/// stores plus the external directories.
pub struct Resolver<'a, S, D> {
    store: &'a S,
    directory: &'a D,
}

impl<'a, S, D> Resolver<'a, S, D>
where
    S: GrantStore + MembershipStore + CreatorRightsStore,
    D: ContainerDirectory + EntityDirectory,
{
    pub fn new(store: &'a S, directory: &'a D) -> Self {
        Self { store, directory }
    }

    /// Resolve a subject's effective permission on an entity.
    ///
    /// Looks up the entity's container first; use
    /// [`resolve_in_container`](Self::resolve_in_container) when the caller
    /// already knows it.
    pub async fn resolve(&self, subject: &Subject, entity: &EntityRef) -> Result<Permission> {
        let info = self
            .directory
            .entity_info(entity)
            .await?
            .ok_or_else(|| PermsError::EntityNotFound(entity.clone()))?;
        self.resolve_in_container(subject, &info.container, entity)
            .await
    }

    /// Resolve a subject's effective permission on an entity within a
    /// container.
    ///
    /// Unknown container or entity surface as NotFound. A storage failure
    /// while computing the creator or grant source fails closed to
    /// no-access.
    pub async fn resolve_in_container(
        &self,
        subject: &Subject,
        container: &ContainerId,
        entity: &EntityRef,
    ) -> Result<Permission> {
        if !self.directory.container_exists(container).await? {
            return Err(PermsError::ContainerNotFound(container.clone()));
        }
        let info = self
            .directory
            .entity_info(entity)
            .await?
            .ok_or_else(|| PermsError::EntityNotFound(entity.clone()))?;
        if &info.container != container {
            return Err(PermsError::EntityNotFound(entity.clone()));
        }

        // 1. Base role is the floor. Absent base role means no access, and
        //    no other signal can override that.
        let base = match self.directory.base_role(subject, container).await {
            Ok(role) => role,
            Err(e) => {
                error!(subject = %subject, container = %container, error = %e,
                    "base role lookup failed, resolving to no access");
                return Ok(Permission::no_access());
            }
        };
        if base.is_none() {
            return Ok(Permission::no_access());
        }

        // 2. Creator role: implicit editor unless permanently revoked.
        let creator = match self.creator_role(subject, entity, &info.created_by).await {
            Ok(role) => role,
            Err(e) => {
                error!(subject = %subject, entity = %entity, error = %e,
                    "creator source failed, resolving to no access");
                return Ok(Permission::no_access());
            }
        };

        // 3. Grant role: max over the direct grant and every group grant.
        let grant = match self.grant_role(subject, container, entity).await {
            Ok(role) => role,
            Err(e) => {
                error!(subject = %subject, entity = %entity, error = %e,
                    "grant source failed, resolving to no access");
                return Ok(Permission::no_access());
            }
        };

        Ok(Permission::from(combine(base, creator, grant)))
    }

    async fn creator_role(
        &self,
        subject: &Subject,
        entity: &EntityRef,
        created_by: &trellis_core::UserId,
    ) -> Result<Option<Role>> {
        let Some(user) = subject.as_user() else {
            return Ok(None);
        };
        if user != created_by {
            return Ok(None);
        }
        let revoked = self.store.is_creator_revoked(entity, user).await?;
        Ok(if revoked { None } else { Some(Role::Editor) })
    }

    async fn grant_role(
        &self,
        subject: &Subject,
        container: &ContainerId,
        entity: &EntityRef,
    ) -> Result<Option<Role>> {
        let mut best: Option<Role> = None;

        let direct = self.store.active_grant(entity, subject).await?;
        if let Some(grant) = direct {
            best = Some(grant.role);
        }

        // Group indirection applies to user subjects only: the groups a
        // user belongs to within this container contribute their grants.
        if let Some(user) = subject.as_user() {
            for group in self.store.groups_of(user, container).await? {
                let group_grant = self
                    .store
                    .active_grant(entity, &Subject::Group(group))
                    .await?;
                if let Some(grant) = group_grant {
                    best = Some(grant.role.max_with(best));
                }
            }
        }

        Ok(best)
    }
}
