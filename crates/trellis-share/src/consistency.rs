//! The conflict and consistency layer.
//!
//! There is exactly one writable copy of a distributable item. Projections
//! are read-optimized references: the shared fields in a view are resolved
//! from the authoritative record at render time, never copied onto the
//! projection. Concurrent edits to the source are decided by
//! last-writer-wins over `updated_at`; there is no field-level merge, the
//! consuming surface shows "updated by X at T" instead.

use serde::{Deserialize, Serialize};

use trellis_core::{EntityInfo, Projection, SharedFields};

/// Outcome of a last-writer-wins comparison for a source edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditDecision {
    /// The edit wins; the caller applies it to the authoritative record.
    Applied,
    /// A later write already landed. Carries the current `updated_at` so
    /// the surface can show who to catch up with.
    Superseded {
        /// The authoritative record's current `updated_at`.
        updated_at: i64,
    },
}

/// Decide a concurrent edit against the authoritative record.
///
/// `incoming_at` is the wall-clock stamp of the incoming edit;
/// `current_at` is the record's `updated_at`. Ties go to the incoming
/// writer, which keeps the rule a total order over retries.
pub fn decide_edit(current_at: i64, incoming_at: i64) -> EditDecision {
    if incoming_at >= current_at {
        EditDecision::Applied
    } else {
        EditDecision::Superseded {
            updated_at: current_at,
        }
    }
}

/// A rendered projection: shared fields from the single source, per-viewer
/// state from the projection row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedItemView {
    /// The viewer's projection, carrying status and per-viewer fields.
    pub projection: Projection,
    /// Shared fields resolved from the authoritative record at render time.
    pub shared: SharedFields,
    /// The authoritative record's `updated_at`.
    pub source_updated_at: i64,
}

/// Resolve a projection against the authoritative record it references.
pub fn resolve_view(info: &EntityInfo, projection: Projection) -> SharedItemView {
    SharedItemView {
        projection,
        shared: info.shared.clone(),
        source_updated_at: info.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{ContainerId, EntityRef, UserId};

    #[test]
    fn later_edit_wins() {
        assert_eq!(decide_edit(1_000, 2_000), EditDecision::Applied);
    }

    #[test]
    fn stale_edit_is_superseded() {
        assert_eq!(
            decide_edit(2_000, 1_000),
            EditDecision::Superseded { updated_at: 2_000 }
        );
    }

    #[test]
    fn ties_go_to_the_incoming_writer() {
        assert_eq!(decide_edit(1_000, 1_000), EditDecision::Applied);
    }

    #[test]
    fn view_resolves_shared_fields_from_the_source() {
        let item = EntityRef::task("t-1");
        let info = EntityInfo {
            entity: item.clone(),
            container: ContainerId::new("c-1"),
            created_by: UserId::new("u-owner"),
            updated_at: 5_000,
            shared: SharedFields {
                title: "quarterly plan".to_string(),
                description: Some("draft".to_string()),
                scheduled_at: Some(9_000),
            },
        };
        let projection =
            Projection::pending(item, UserId::new("u-a"), None, false, true, 1_000);

        let view = resolve_view(&info, projection.clone());
        assert_eq!(view.shared.title, "quarterly plan");
        assert_eq!(view.source_updated_at, 5_000);
        assert_eq!(view.projection, projection);
    }
}
