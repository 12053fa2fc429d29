//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a kernel over the in-memory
//! store and directory, with one seeded container and helpers for adding
//! users, entities and groups.

use trellis::{Kernel, KernelConfig};
use trellis_core::{
    ContainerId, EntityInfo, EntityKind, EntityRef, Role, SharedFields, Subject, UserId,
};
use trellis_store::{MemoryDirectory, MemoryStore};

use crate::chaos::ChaosStore;

/// The container every fixture seeds.
pub const CONTAINER: &str = "c-fixture";

/// A test fixture: a kernel over in-memory backends plus seeding helpers.
pub struct TestFixture<S = MemoryStore> {
    pub kernel: Kernel<S, MemoryDirectory>,
}

impl TestFixture<MemoryStore> {
    /// Create a fixture over the plain memory store.
    pub fn new() -> Self {
        Self {
            kernel: Kernel::new(
                MemoryStore::new(),
                seeded_directory(),
                KernelConfig::default(),
            ),
        }
    }
}

impl Default for TestFixture<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture<ChaosStore> {
    /// Create a fixture whose store can inject read failures.
    pub fn with_chaos() -> Self {
        Self {
            kernel: Kernel::new(
                ChaosStore::new(),
                seeded_directory(),
                KernelConfig::default(),
            ),
        }
    }
}

impl<S> TestFixture<S>
where
    S: trellis_store::Store,
{
    /// The fixture container id.
    pub fn container(&self) -> ContainerId {
        ContainerId::new(CONTAINER)
    }

    /// Seed a user with a base role in the fixture container.
    pub fn seed_user(&self, user: &str, role: Role) -> UserId {
        let user = UserId::new(user);
        self.kernel.directory().put_base_role(
            Subject::User(user.clone()),
            self.container(),
            role,
        );
        user
    }

    /// Drop a user's base role, as the external registry does on container
    /// exit.
    pub fn drop_base_role(&self, user: &UserId) {
        self.kernel
            .directory()
            .clear_base_role(&Subject::User(user.clone()), &self.container());
    }

    /// Seed a distributable task created by `creator`.
    pub fn seed_task(&self, id: &str, creator: &str) -> EntityRef {
        self.seed_entity(EntityKind::Task, id, creator)
    }

    /// Seed an entity of any kind created by `creator`.
    pub fn seed_entity(&self, kind: EntityKind, id: &str, creator: &str) -> EntityRef {
        let entity = EntityRef::new(kind, id);
        self.kernel.directory().put_entity(EntityInfo {
            entity: entity.clone(),
            container: self.container(),
            created_by: UserId::new(creator),
            updated_at: 1_000,
            shared: SharedFields {
                title: format!("{kind} {id}"),
                description: None,
                scheduled_at: None,
            },
        });
        entity
    }
}

fn seeded_directory() -> MemoryDirectory {
    let directory = MemoryDirectory::new();
    directory.put_container(ContainerId::new(CONTAINER));
    directory
}
