//! Proptest strategies for property-based tests.

use proptest::prelude::*;

use trellis_core::{EntityKind, Role, UserId};

/// Any role.
pub fn role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Viewer), Just(Role::Editor), Just(Role::Owner)]
}

/// A role or no role at all.
pub fn optional_role() -> impl Strategy<Value = Option<Role>> {
    proptest::option::of(role())
}

/// Any entity kind, structural and distributable alike.
pub fn entity_kind() -> impl Strategy<Value = EntityKind> {
    prop_oneof![
        Just(EntityKind::Track),
        Just(EntityKind::Subtrack),
        Just(EntityKind::RoadmapItem),
        Just(EntityKind::Task),
        Just(EntityKind::CalendarEvent),
    ]
}

/// Short printable user ids.
pub fn user_id() -> impl Strategy<Value = UserId> {
    "[a-z]{1,8}".prop_map(|s| UserId::new(format!("u-{s}")))
}
