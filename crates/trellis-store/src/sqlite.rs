//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend for the Trellis kernel. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use trellis_core::{
    AuditEvent, ContainerId, CreatorRevocation, EntityGrant, EntityKind, EntityRef, GroupId,
    GroupRecord, Membership, Projection, ProjectionId, ProjectionStatus, Role, Subject, UserId,
    AuditAction, AuditEventId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    AuditStore, CreatorRightsStore, GrantStore, InsertOutcome, MembershipStore, ProjectionStore,
};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking to
/// avoid blocking the async runtime. The partial unique indexes created by
/// the migrations enforce the one-active-row constraints, so a concurrent
/// duplicate insert loses the race inside SQLite itself.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        debug!(path = %path.as_ref().display(), "opening sqlite store");
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn on_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Backend(format!("mutex poisoned: {e}")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("spawn_blocking failed: {e}")))?
    }
}

/// Whether a rusqlite error is a uniqueness-constraint violation.
fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Map a domain parse failure onto the column it came from.
fn bad_column<T>(
    idx: usize,
    parsed: std::result::Result<T, trellis_core::ValidationError>,
) -> rusqlite::Result<T> {
    parsed.map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupRecord> {
    Ok(GroupRecord {
        id: GroupId::new(row.get::<_, String>("group_id")?),
        container: ContainerId::new(row.get::<_, String>("container_id")?),
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_grant(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityGrant> {
    let entity_kind: String = row.get("entity_kind")?;
    let subject_kind: String = row.get("subject_kind")?;
    let subject_id: String = row.get("subject_id")?;
    let role: String = row.get("role")?;

    Ok(EntityGrant {
        entity: EntityRef::new(
            bad_column(0, EntityKind::parse(&entity_kind))?,
            row.get::<_, String>("entity_id")?,
        ),
        subject: bad_column(2, Subject::parse(&subject_kind, &subject_id))?,
        role: bad_column(4, Role::parse(&role))?,
        created_by: UserId::new(row.get::<_, String>("created_by")?),
        created_at: row.get("created_at")?,
        revoked_by: row.get::<_, Option<String>>("revoked_by")?.map(UserId::new),
        revoked_at: row.get("revoked_at")?,
    })
}

fn row_to_projection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Projection> {
    let item_kind: String = row.get("item_kind")?;
    let status: String = row.get("status")?;

    Ok(Projection {
        id: ProjectionId::new(row.get::<_, String>("projection_id")?),
        item: EntityRef::new(
            bad_column(1, EntityKind::parse(&item_kind))?,
            row.get::<_, String>("item_id")?,
        ),
        subject: UserId::new(row.get::<_, String>("subject_id")?),
        source_group: row
            .get::<_, Option<String>>("source_group")?
            .map(GroupId::new),
        status: bad_column(5, ProjectionStatus::parse(&status))?,
        can_edit: row.get("can_edit")?,
        can_complete: row.get("can_complete")?,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
        status_changed_at: row.get("status_changed_at")?,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let entity_kind: String = row.get("entity_kind")?;
    let action: String = row.get("action")?;
    let subject_kind: Option<String> = row.get("subject_kind")?;
    let subject_id: Option<String> = row.get("subject_id")?;

    let subject = match (subject_kind, subject_id) {
        (Some(kind), Some(id)) => Some(bad_column(5, Subject::parse(&kind, &id))?),
        _ => None,
    };

    let action = parse_action(&action).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(AuditEvent {
        id: AuditEventId::new(row.get::<_, String>("event_id")?),
        actor: UserId::new(row.get::<_, String>("actor")?),
        action,
        entity: EntityRef::new(
            bad_column(3, EntityKind::parse(&entity_kind))?,
            row.get::<_, String>("entity_id")?,
        ),
        subject,
        before: row.get("before_state")?,
        after: row.get("after_state")?,
        at: row.get("at")?,
    })
}

fn parse_action(s: &str) -> std::result::Result<AuditAction, String> {
    match s {
        "grant_created" => Ok(AuditAction::GrantCreated),
        "grant_revoked" => Ok(AuditAction::GrantRevoked),
        "creator_rights_revoked" => Ok(AuditAction::CreatorRightsRevoked),
        "projection_created" => Ok(AuditAction::ProjectionCreated),
        "projection_accepted" => Ok(AuditAction::ProjectionAccepted),
        "projection_declined" => Ok(AuditAction::ProjectionDeclined),
        "projection_revoked" => Ok(AuditAction::ProjectionRevoked),
        "projection_reinvited" => Ok(AuditAction::ProjectionReinvited),
        other => Err(format!("unknown audit action: {other:?}")),
    }
}

fn query_active_grant(
    conn: &Connection,
    entity: &EntityRef,
    subject: &Subject,
) -> Result<Option<EntityGrant>> {
    conn.query_row(
        "SELECT entity_kind, entity_id, subject_kind, subject_id, role,
                created_by, created_at, revoked_by, revoked_at
         FROM entity_grants
         WHERE entity_kind = ?1 AND entity_id = ?2
           AND subject_kind = ?3 AND subject_id = ?4
           AND revoked_at IS NULL",
        params![
            entity.kind.as_str(),
            entity.id.as_str(),
            subject.kind(),
            subject.id(),
        ],
        row_to_grant,
    )
    .optional()
    .map_err(StoreError::from)
}

fn query_active_projection(
    conn: &Connection,
    item: &EntityRef,
    subject: &UserId,
) -> Result<Option<Projection>> {
    conn.query_row(
        "SELECT projection_id, item_kind, item_id, subject_id, source_group, status,
                can_edit, can_complete, completed_at, created_at, status_changed_at
         FROM projections
         WHERE item_kind = ?1 AND item_id = ?2 AND subject_id = ?3
           AND status IN ('pending', 'accepted')",
        params![item.kind.as_str(), item.id.as_str(), subject.as_str()],
        row_to_projection,
    )
    .optional()
    .map_err(StoreError::from)
}

/// Remove a user from every group of a container inside one transaction.
///
/// `fail_after` is test instrumentation: abort (and roll back) after that
/// many memberships have been deleted, to prove no partial state survives.
fn cascade_remove(
    conn: &mut Connection,
    user: &UserId,
    container: &ContainerId,
    fail_after: Option<usize>,
) -> Result<usize> {
    let tx = conn.transaction()?;

    let group_ids: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT gm.group_id FROM group_members gm
             JOIN groups g ON g.group_id = gm.group_id
             WHERE gm.user_id = ?1 AND g.container_id = ?2
             ORDER BY gm.group_id",
        )?;
        let ids = stmt
            .query_map(params![user.as_str(), container.as_str()], |row| {
                row.get(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids
    };

    let mut removed = 0usize;
    for group_id in &group_ids {
        if fail_after.is_some_and(|n| removed >= n) {
            // Dropping the uncommitted transaction rolls everything back.
            return Err(StoreError::Backend(
                "injected cascade failure".to_string(),
            ));
        }
        removed += tx.execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user.as_str()],
        )?;
    }

    tx.commit()?;
    debug!(user = %user, container = %container, removed, "container cascade committed");
    Ok(removed)
}

#[async_trait]
impl MembershipStore for SqliteStore {
    async fn create_group(&self, group: &GroupRecord) -> Result<InsertOutcome<GroupRecord>> {
        let group = group.clone();
        self.on_conn(move |conn| {
            match conn.execute(
                "INSERT INTO groups (group_id, container_id, name, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    group.id.as_str(),
                    group.container.as_str(),
                    group.name,
                    group.created_at,
                ],
            ) {
                Ok(_) => Ok(InsertOutcome::Inserted),
                Err(e) if is_constraint_violation(&e) => {
                    let existing = conn
                        .query_row(
                            "SELECT group_id, container_id, name, created_at
                             FROM groups WHERE group_id = ?1",
                            params![group.id.as_str()],
                            row_to_group,
                        )
                        .optional()?
                        .ok_or_else(|| {
                            StoreError::InvalidData("constraint hit but row missing".into())
                        })?;
                    Ok(InsertOutcome::AlreadyExists { existing })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_group(&self, group: &GroupId) -> Result<Option<GroupRecord>> {
        let group = group.clone();
        self.on_conn(move |conn| {
            conn.query_row(
                "SELECT group_id, container_id, name, created_at
                 FROM groups WHERE group_id = ?1",
                params![group.as_str()],
                row_to_group,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn groups_in_container(&self, container: &ContainerId) -> Result<Vec<GroupRecord>> {
        let container = container.clone();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT group_id, container_id, name, created_at
                 FROM groups WHERE container_id = ?1
                 ORDER BY created_at, group_id",
            )?;
            let groups = stmt
                .query_map(params![container.as_str()], row_to_group)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(groups)
        })
        .await
    }

    async fn add_member(
        &self,
        group: &GroupId,
        user: &UserId,
        at: i64,
    ) -> Result<InsertOutcome<Membership>> {
        let group = group.clone();
        let user = user.clone();
        self.on_conn(move |conn| {
            let known: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM groups WHERE group_id = ?1)",
                params![group.as_str()],
                |row| row.get(0),
            )?;
            if !known {
                return Err(StoreError::NotFound(format!("group {group}")));
            }

            match conn.execute(
                "INSERT INTO group_members (group_id, user_id, added_at) VALUES (?1, ?2, ?3)",
                params![group.as_str(), user.as_str(), at],
            ) {
                Ok(_) => Ok(InsertOutcome::Inserted),
                Err(e) if is_constraint_violation(&e) => {
                    let added_at: i64 = conn.query_row(
                        "SELECT added_at FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                        params![group.as_str(), user.as_str()],
                        |row| row.get(0),
                    )?;
                    Ok(InsertOutcome::AlreadyExists {
                        existing: Membership {
                            group: group.clone(),
                            user: user.clone(),
                            added_at,
                        },
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn remove_member(&self, group: &GroupId, user: &UserId) -> Result<bool> {
        let group = group.clone();
        let user = user.clone();
        self.on_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params![group.as_str(), user.as_str()],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn members_of(&self, group: &GroupId) -> Result<Vec<UserId>> {
        let group = group.clone();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM group_members WHERE group_id = ?1 ORDER BY user_id",
            )?;
            let members = stmt
                .query_map(params![group.as_str()], |row| {
                    row.get::<_, String>(0).map(UserId::new)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(members)
        })
        .await
    }

    async fn groups_of(&self, user: &UserId, container: &ContainerId) -> Result<Vec<GroupId>> {
        let user = user.clone();
        let container = container.clone();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT gm.group_id FROM group_members gm
                 JOIN groups g ON g.group_id = gm.group_id
                 WHERE gm.user_id = ?1 AND g.container_id = ?2
                 ORDER BY gm.group_id",
            )?;
            let groups = stmt
                .query_map(params![user.as_str(), container.as_str()], |row| {
                    row.get::<_, String>(0).map(GroupId::new)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(groups)
        })
        .await
    }

    async fn remove_from_container_groups(
        &self,
        user: &UserId,
        container: &ContainerId,
    ) -> Result<usize> {
        let user = user.clone();
        let container = container.clone();
        self.on_conn(move |conn| cascade_remove(conn, &user, &container, None))
            .await
    }
}

#[async_trait]
impl GrantStore for SqliteStore {
    async fn insert_grant(&self, grant: &EntityGrant) -> Result<InsertOutcome<EntityGrant>> {
        let grant = grant.clone();
        self.on_conn(move |conn| {
            match conn.execute(
                "INSERT INTO entity_grants
                    (entity_kind, entity_id, subject_kind, subject_id, role,
                     created_by, created_at, revoked_by, revoked_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    grant.entity.kind.as_str(),
                    grant.entity.id.as_str(),
                    grant.subject.kind(),
                    grant.subject.id(),
                    grant.role.as_str(),
                    grant.created_by.as_str(),
                    grant.created_at,
                    grant.revoked_by.as_ref().map(|u| u.as_str()),
                    grant.revoked_at,
                ],
            ) {
                Ok(_) => Ok(InsertOutcome::Inserted),
                Err(e) if is_constraint_violation(&e) => {
                    let existing = query_active_grant(conn, &grant.entity, &grant.subject)?
                        .ok_or_else(|| {
                            StoreError::InvalidData("constraint hit but row missing".into())
                        })?;
                    Ok(InsertOutcome::AlreadyExists { existing })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn revoke_grant(
        &self,
        entity: &EntityRef,
        subject: &Subject,
        revoked_by: &UserId,
        at: i64,
    ) -> Result<Option<EntityGrant>> {
        let entity = entity.clone();
        let subject = subject.clone();
        let revoked_by = revoked_by.clone();
        self.on_conn(move |conn| {
            let Some(mut grant) = query_active_grant(conn, &entity, &subject)? else {
                return Ok(None);
            };

            conn.execute(
                "UPDATE entity_grants SET revoked_by = ?5, revoked_at = ?6
                 WHERE entity_kind = ?1 AND entity_id = ?2
                   AND subject_kind = ?3 AND subject_id = ?4
                   AND revoked_at IS NULL",
                params![
                    entity.kind.as_str(),
                    entity.id.as_str(),
                    subject.kind(),
                    subject.id(),
                    revoked_by.as_str(),
                    at,
                ],
            )?;

            grant.revoke(revoked_by.clone(), at);
            Ok(Some(grant))
        })
        .await
    }

    async fn active_grant(
        &self,
        entity: &EntityRef,
        subject: &Subject,
    ) -> Result<Option<EntityGrant>> {
        let entity = entity.clone();
        let subject = subject.clone();
        self.on_conn(move |conn| query_active_grant(conn, &entity, &subject))
            .await
    }

    async fn active_grants_for_entity(&self, entity: &EntityRef) -> Result<Vec<EntityGrant>> {
        let entity = entity.clone();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT entity_kind, entity_id, subject_kind, subject_id, role,
                        created_by, created_at, revoked_by, revoked_at
                 FROM entity_grants
                 WHERE entity_kind = ?1 AND entity_id = ?2 AND revoked_at IS NULL
                 ORDER BY created_at",
            )?;
            let grants = stmt
                .query_map(
                    params![entity.kind.as_str(), entity.id.as_str()],
                    row_to_grant,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(grants)
        })
        .await
    }

    async fn active_grants_for_subject(&self, subject: &Subject) -> Result<Vec<EntityGrant>> {
        let subject = subject.clone();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT entity_kind, entity_id, subject_kind, subject_id, role,
                        created_by, created_at, revoked_by, revoked_at
                 FROM entity_grants
                 WHERE subject_kind = ?1 AND subject_id = ?2 AND revoked_at IS NULL
                 ORDER BY created_at",
            )?;
            let grants = stmt
                .query_map(params![subject.kind(), subject.id()], row_to_grant)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(grants)
        })
        .await
    }

    async fn grant_history_for_entity(&self, entity: &EntityRef) -> Result<Vec<EntityGrant>> {
        let entity = entity.clone();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT entity_kind, entity_id, subject_kind, subject_id, role,
                        created_by, created_at, revoked_by, revoked_at
                 FROM entity_grants
                 WHERE entity_kind = ?1 AND entity_id = ?2
                 ORDER BY created_at, rowid",
            )?;
            let grants = stmt
                .query_map(
                    params![entity.kind.as_str(), entity.id.as_str()],
                    row_to_grant,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(grants)
        })
        .await
    }
}

#[async_trait]
impl CreatorRightsStore for SqliteStore {
    async fn record_creator_revocation(
        &self,
        revocation: &CreatorRevocation,
    ) -> Result<InsertOutcome<CreatorRevocation>> {
        let revocation = revocation.clone();
        self.on_conn(move |conn| {
            match conn.execute(
                "INSERT INTO creator_revocations
                    (entity_kind, entity_id, user_id, revoked_by, revoked_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    revocation.entity.kind.as_str(),
                    revocation.entity.id.as_str(),
                    revocation.user.as_str(),
                    revocation.revoked_by.as_str(),
                    revocation.revoked_at,
                ],
            ) {
                Ok(_) => Ok(InsertOutcome::Inserted),
                Err(e) if is_constraint_violation(&e) => {
                    let existing = conn
                        .query_row(
                            "SELECT entity_kind, entity_id, user_id, revoked_by, revoked_at
                             FROM creator_revocations
                             WHERE entity_kind = ?1 AND entity_id = ?2 AND user_id = ?3",
                            params![
                                revocation.entity.kind.as_str(),
                                revocation.entity.id.as_str(),
                                revocation.user.as_str(),
                            ],
                            |row| {
                                let entity_kind: String = row.get("entity_kind")?;
                                Ok(CreatorRevocation {
                                    entity: EntityRef::new(
                                        bad_column(0, EntityKind::parse(&entity_kind))?,
                                        row.get::<_, String>("entity_id")?,
                                    ),
                                    user: UserId::new(row.get::<_, String>("user_id")?),
                                    revoked_by: UserId::new(
                                        row.get::<_, String>("revoked_by")?,
                                    ),
                                    revoked_at: row.get("revoked_at")?,
                                })
                            },
                        )
                        .optional()?
                        .ok_or_else(|| {
                            StoreError::InvalidData("constraint hit but row missing".into())
                        })?;
                    Ok(InsertOutcome::AlreadyExists { existing })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn is_creator_revoked(&self, entity: &EntityRef, user: &UserId) -> Result<bool> {
        let entity = entity.clone();
        let user = user.clone();
        self.on_conn(move |conn| {
            let revoked: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM creator_revocations
                 WHERE entity_kind = ?1 AND entity_id = ?2 AND user_id = ?3)",
                params![entity.kind.as_str(), entity.id.as_str(), user.as_str()],
                |row| row.get(0),
            )?;
            Ok(revoked)
        })
        .await
    }
}

const PROJECTION_COLUMNS: &str =
    "projection_id, item_kind, item_id, subject_id, source_group, status,
     can_edit, can_complete, completed_at, created_at, status_changed_at";

#[async_trait]
impl ProjectionStore for SqliteStore {
    async fn insert_projection(
        &self,
        projection: &Projection,
    ) -> Result<InsertOutcome<Projection>> {
        let projection = projection.clone();
        self.on_conn(move |conn| {
            match conn.execute(
                "INSERT INTO projections
                    (projection_id, item_kind, item_id, subject_id, source_group, status,
                     can_edit, can_complete, completed_at, created_at, status_changed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    projection.id.as_str(),
                    projection.item.kind.as_str(),
                    projection.item.id.as_str(),
                    projection.subject.as_str(),
                    projection.source_group.as_ref().map(|g| g.as_str()),
                    projection.status.as_str(),
                    projection.can_edit,
                    projection.can_complete,
                    projection.completed_at,
                    projection.created_at,
                    projection.status_changed_at,
                ],
            ) {
                Ok(_) => Ok(InsertOutcome::Inserted),
                Err(e) if is_constraint_violation(&e) => {
                    let existing =
                        query_active_projection(conn, &projection.item, &projection.subject)?
                            .ok_or_else(|| {
                                StoreError::InvalidData("constraint hit but row missing".into())
                            })?;
                    Ok(InsertOutcome::AlreadyExists { existing })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_projection(&self, id: &ProjectionId) -> Result<Option<Projection>> {
        let id = id.clone();
        self.on_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {PROJECTION_COLUMNS} FROM projections WHERE projection_id = ?1"),
                params![id.as_str()],
                row_to_projection,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn projections_for_item(&self, item: &EntityRef) -> Result<Vec<Projection>> {
        let item = item.clone();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROJECTION_COLUMNS} FROM projections
                 WHERE item_kind = ?1 AND item_id = ?2
                 ORDER BY created_at, rowid"
            ))?;
            let rows = stmt
                .query_map(params![item.kind.as_str(), item.id.as_str()], row_to_projection)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn projections_for_subject(&self, subject: &UserId) -> Result<Vec<Projection>> {
        let subject = subject.clone();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROJECTION_COLUMNS} FROM projections
                 WHERE subject_id = ?1
                 ORDER BY created_at, rowid"
            ))?;
            let rows = stmt
                .query_map(params![subject.as_str()], row_to_projection)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn projections_for_item_and_subject(
        &self,
        item: &EntityRef,
        subject: &UserId,
    ) -> Result<Vec<Projection>> {
        let item = item.clone();
        let subject = subject.clone();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROJECTION_COLUMNS} FROM projections
                 WHERE item_kind = ?1 AND item_id = ?2 AND subject_id = ?3
                 ORDER BY created_at, rowid"
            ))?;
            let rows = stmt
                .query_map(
                    params![item.kind.as_str(), item.id.as_str(), subject.as_str()],
                    row_to_projection,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn transition_status(
        &self,
        id: &ProjectionId,
        from: ProjectionStatus,
        to: ProjectionStatus,
        at: i64,
    ) -> Result<Option<Projection>> {
        let id = id.clone();
        self.on_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE projections SET status = ?3, status_changed_at = ?4
                 WHERE projection_id = ?1 AND status = ?2",
                params![id.as_str(), from.as_str(), to.as_str(), at],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            conn.query_row(
                &format!("SELECT {PROJECTION_COLUMNS} FROM projections WHERE projection_id = ?1"),
                params![id.as_str()],
                row_to_projection,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn set_completed(
        &self,
        id: &ProjectionId,
        completed_at: Option<i64>,
    ) -> Result<Option<Projection>> {
        let id = id.clone();
        self.on_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE projections SET completed_at = ?2 WHERE projection_id = ?1",
                params![id.as_str(), completed_at],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            conn.query_row(
                &format!("SELECT {PROJECTION_COLUMNS} FROM projections WHERE projection_id = ?1"),
                params![id.as_str()],
                row_to_projection,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn append_event(&self, event: &AuditEvent) -> Result<()> {
        let event = event.clone();
        self.on_conn(move |conn| {
            conn.execute(
                "INSERT INTO audit_events
                    (event_id, actor, action, entity_kind, entity_id,
                     subject_kind, subject_id, before_state, after_state, at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    event.id.as_str(),
                    event.actor.as_str(),
                    event.action.as_str(),
                    event.entity.kind.as_str(),
                    event.entity.id.as_str(),
                    event.subject.as_ref().map(|s| s.kind()),
                    event.subject.as_ref().map(|s| s.id()),
                    event.before,
                    event.after,
                    event.at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn events_for_entity(&self, entity: &EntityRef) -> Result<Vec<AuditEvent>> {
        let entity = entity.clone();
        self.on_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT event_id, actor, action, entity_kind, entity_id,
                        subject_kind, subject_id, before_state, after_state, at
                 FROM audit_events
                 WHERE entity_kind = ?1 AND entity_id = ?2
                 ORDER BY at, rowid",
            )?;
            let events = stmt
                .query_map(
                    params![entity.kind.as_str(), entity.id.as_str()],
                    row_to_event,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::Role;

    #[tokio::test]
    async fn insert_and_fetch_grant() {
        let store = SqliteStore::open_memory().unwrap();
        let grant = EntityGrant::new(
            EntityRef::task("t-1"),
            Subject::User(UserId::new("u-2")),
            Role::Editor,
            UserId::new("u-1"),
            1_000,
        );

        assert!(store.insert_grant(&grant).await.unwrap().is_inserted());
        let fetched = store
            .active_grant(&grant.entity, &grant.subject)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, grant);
    }

    #[tokio::test]
    async fn duplicate_active_grant_loses_the_race() {
        let store = SqliteStore::open_memory().unwrap();
        let grant = EntityGrant::new(
            EntityRef::task("t-1"),
            Subject::Group(GroupId::new("g-1")),
            Role::Viewer,
            UserId::new("u-1"),
            1_000,
        );

        store.insert_grant(&grant).await.unwrap();
        match store.insert_grant(&grant).await.unwrap() {
            InsertOutcome::AlreadyExists { existing } => {
                assert_eq!(existing.role, Role::Viewer);
            }
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn revoke_then_recreate() {
        let store = SqliteStore::open_memory().unwrap();
        let entity = EntityRef::task("t-1");
        let subject = Subject::User(UserId::new("u-2"));
        let actor = UserId::new("u-1");

        let grant = EntityGrant::new(entity.clone(), subject.clone(), Role::Viewer,
            actor.clone(), 1_000);
        store.insert_grant(&grant).await.unwrap();

        let revoked = store
            .revoke_grant(&entity, &subject, &actor, 2_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(revoked.revoked_at, Some(2_000));

        // Idempotent second revoke.
        assert!(store
            .revoke_grant(&entity, &subject, &actor, 3_000)
            .await
            .unwrap()
            .is_none());

        // Recreate with a different role.
        let regrant = EntityGrant::new(entity.clone(), subject.clone(), Role::Editor,
            actor.clone(), 4_000);
        assert!(store.insert_grant(&regrant).await.unwrap().is_inserted());

        let history = store.grant_history_for_entity(&entity).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_active());
        assert!(history[1].is_active());
    }

    #[tokio::test]
    async fn creator_revocation_is_permanent_and_idempotent() {
        let store = SqliteStore::open_memory().unwrap();
        let entity = EntityRef::task("t-1");
        let user = UserId::new("u-2");

        assert!(!store.is_creator_revoked(&entity, &user).await.unwrap());

        let revocation = CreatorRevocation {
            entity: entity.clone(),
            user: user.clone(),
            revoked_by: UserId::new("u-owner"),
            revoked_at: 1_000,
        };
        assert!(store
            .record_creator_revocation(&revocation)
            .await
            .unwrap()
            .is_inserted());
        assert!(store.is_creator_revoked(&entity, &user).await.unwrap());

        // Recording again returns the original row.
        let again = CreatorRevocation {
            revoked_at: 9_000,
            ..revocation.clone()
        };
        match store.record_creator_revocation(&again).await.unwrap() {
            InsertOutcome::AlreadyExists { existing } => {
                assert_eq!(existing.revoked_at, 1_000);
            }
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn projection_race_observes_existing_row() {
        let store = SqliteStore::open_memory().unwrap();
        let item = EntityRef::task("t-1");
        let user = UserId::new("u-1");

        let first = Projection::pending(item.clone(), user.clone(), None, true, true, 1_000);
        let second = Projection::pending(item.clone(), user.clone(), None, false, false, 1_001);

        assert!(store.insert_projection(&first).await.unwrap().is_inserted());
        match store.insert_projection(&second).await.unwrap() {
            InsertOutcome::AlreadyExists { existing } => assert_eq!(existing.id, first.id),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cascade_rolls_back_on_injected_failure() {
        let store = SqliteStore::open_memory().unwrap();
        let container = ContainerId::new("c-1");
        let user = UserId::new("u-1");

        let mut ids = Vec::new();
        for name in ["a", "b", "c", "d", "e"] {
            let g = GroupRecord::new(container.clone(), name, 1_000);
            store.create_group(&g).await.unwrap();
            ids.push(g.id);
        }
        for gid in &ids[..3] {
            store.add_member(gid, &user, 1_000).await.unwrap();
        }

        // Inject a failure after 2 of 3 removals: the transaction must
        // roll back, leaving all 3 memberships in place.
        {
            let mut conn = store.conn.lock().unwrap();
            let err = cascade_remove(&mut conn, &user, &container, Some(2)).unwrap_err();
            assert!(matches!(err, StoreError::Backend(_)));
        }
        assert_eq!(store.groups_of(&user, &container).await.unwrap().len(), 3);

        // The real cascade removes everything.
        let removed = store
            .remove_from_container_groups(&user, &container)
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert!(store.groups_of(&user, &container).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn audit_events_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let entity = EntityRef::task("t-1");
        let event = AuditEvent::new(
            UserId::new("u-1"),
            AuditAction::GrantCreated,
            entity.clone(),
            Some(Subject::User(UserId::new("u-2"))),
            None,
            Some("{\"role\":\"editor\"}".to_string()),
            1_000,
        );

        store.append_event(&event).await.unwrap();
        let events = store.events_for_entity(&entity).await.unwrap();
        assert_eq!(events, vec![event]);
    }

    #[tokio::test]
    async fn open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.db");
        let store = SqliteStore::open(&path).unwrap();

        let g = GroupRecord::new(ContainerId::new("c-1"), "design", 1_000);
        store.create_group(&g).await.unwrap();
        drop(store);

        // Reopen and read back.
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_group(&g.id).await.unwrap().unwrap().name, "design");
    }
}
