//! Creator rights: the implicit editor permission held by an entity's
//! creator.
//!
//! The right is granted atomically with the entity itself (it is derived
//! from `created_by`, so there is no separate grant row to forget). It is
//! revocable exactly once, by a container owner; revocation is permanent
//! and re-enabling access requires an explicit entity grant.

use trellis_core::{CreatorRevocation, EntityRef, Role, Subject, UserId};
use trellis_store::{ContainerDirectory, CreatorRightsStore, EntityDirectory, InsertOutcome};

use crate::error::{PermsError, Result};

/// Inspects and revokes creator-derived permission.
pub struct CreatorRights<'a, S, D> {
    store: &'a S,
    directory: &'a D,
}

impl<'a, S, D> CreatorRights<'a, S, D>
where
    S: CreatorRightsStore,
    D: ContainerDirectory + EntityDirectory,
{
    pub fn new(store: &'a S, directory: &'a D) -> Self {
        Self { store, directory }
    }

    /// Whether `user` currently holds creator rights on `entity`:
    /// they created it and no revocation exists for the pair.
    pub async fn has_creator_rights(&self, entity: &EntityRef, user: &UserId) -> Result<bool> {
        let info = self
            .directory
            .entity_info(entity)
            .await?
            .ok_or_else(|| PermsError::EntityNotFound(entity.clone()))?;
        if &info.created_by != user {
            return Ok(false);
        }
        Ok(!self.store.is_creator_revoked(entity, user).await?)
    }

    /// Permanently revoke `user`'s creator rights on `entity`.
    ///
    /// The revoker must hold the `Owner` base role in the entity's
    /// container. Revoking an already-revoked pair returns the original
    /// revocation unchanged.
    pub async fn revoke(
        &self,
        entity: &EntityRef,
        user: &UserId,
        revoker: &UserId,
        at: i64,
    ) -> Result<CreatorRevocation> {
        let info = self
            .directory
            .entity_info(entity)
            .await?
            .ok_or_else(|| PermsError::EntityNotFound(entity.clone()))?;

        let revoker_role = self
            .directory
            .base_role(&Subject::User(revoker.clone()), &info.container)
            .await?;
        if revoker_role != Some(Role::Owner) {
            return Err(PermsError::NotAuthorized(format!(
                "revoking creator rights requires the owner role in container {}",
                info.container
            )));
        }

        let revocation = CreatorRevocation {
            entity: entity.clone(),
            user: user.clone(),
            revoked_by: revoker.clone(),
            revoked_at: at,
        };
        match self.store.record_creator_revocation(&revocation).await? {
            InsertOutcome::Inserted => Ok(revocation),
            InsertOutcome::AlreadyExists { existing } => Ok(existing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{ContainerId, EntityInfo, SharedFields};
    use trellis_store::{MemoryDirectory, MemoryStore};

    fn seed(directory: &MemoryDirectory) -> EntityRef {
        let entity = EntityRef::task("t-1");
        directory.put_entity(EntityInfo {
            entity: entity.clone(),
            container: ContainerId::new("c-1"),
            created_by: UserId::new("u-creator"),
            updated_at: 1_000,
            shared: SharedFields::default(),
        });
        directory.put_base_role(
            Subject::User(UserId::new("u-owner")),
            ContainerId::new("c-1"),
            Role::Owner,
        );
        directory.put_base_role(
            Subject::User(UserId::new("u-editor")),
            ContainerId::new("c-1"),
            Role::Editor,
        );
        entity
    }

    #[tokio::test]
    async fn creator_holds_rights_until_revoked() {
        let store = MemoryStore::new();
        let directory = MemoryDirectory::new();
        let entity = seed(&directory);
        let rights = CreatorRights::new(&store, &directory);

        let creator = UserId::new("u-creator");
        assert!(rights.has_creator_rights(&entity, &creator).await.unwrap());

        rights
            .revoke(&entity, &creator, &UserId::new("u-owner"), 2_000)
            .await
            .unwrap();
        assert!(!rights.has_creator_rights(&entity, &creator).await.unwrap());
    }

    #[tokio::test]
    async fn non_creator_never_holds_rights() {
        let store = MemoryStore::new();
        let directory = MemoryDirectory::new();
        let entity = seed(&directory);
        let rights = CreatorRights::new(&store, &directory);

        assert!(!rights
            .has_creator_rights(&entity, &UserId::new("u-editor"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn revoke_requires_owner_base_role() {
        let store = MemoryStore::new();
        let directory = MemoryDirectory::new();
        let entity = seed(&directory);
        let rights = CreatorRights::new(&store, &directory);

        let err = rights
            .revoke(
                &entity,
                &UserId::new("u-creator"),
                &UserId::new("u-editor"),
                2_000,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::NotAuthorized(_)));

        // No partial effect: the right is still intact.
        assert!(rights
            .has_creator_rights(&entity, &UserId::new("u-creator"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn second_revoke_returns_the_original() {
        let store = MemoryStore::new();
        let directory = MemoryDirectory::new();
        let entity = seed(&directory);
        let rights = CreatorRights::new(&store, &directory);

        let creator = UserId::new("u-creator");
        let owner = UserId::new("u-owner");
        let first = rights.revoke(&entity, &creator, &owner, 2_000).await.unwrap();
        let second = rights.revoke(&entity, &creator, &owner, 9_000).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.revoked_at, 2_000);
    }
}
