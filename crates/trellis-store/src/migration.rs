//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL
//! string that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Container-scoped groups
        CREATE TABLE groups (
            group_id TEXT PRIMARY KEY,
            container_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Group memberships
        CREATE TABLE group_members (
            group_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            added_at INTEGER NOT NULL,
            PRIMARY KEY (group_id, user_id)
        );

        -- Entity grants: append-only, revocation stamps the row.
        -- The partial unique index enforces at most one ACTIVE grant per
        -- (entity, subject) tuple; revoked rows stay for audit.
        CREATE TABLE entity_grants (
            entity_kind TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            subject_kind TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            role TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            revoked_by TEXT,
            revoked_at INTEGER
        );

        -- Creator revocations: permanent, one per (entity, creator).
        CREATE TABLE creator_revocations (
            entity_kind TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            revoked_by TEXT NOT NULL,
            revoked_at INTEGER NOT NULL,
            PRIMARY KEY (entity_kind, entity_id, user_id)
        );

        -- Projections: never deleted, terminal statuses retained.
        -- The partial unique index enforces at most one ACTIVE projection
        -- per (item, subject); a concurrent duplicate insert loses the race
        -- and observes the existing row.
        CREATE TABLE projections (
            projection_id TEXT PRIMARY KEY,
            item_kind TEXT NOT NULL,
            item_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            source_group TEXT,
            status TEXT NOT NULL,
            can_edit INTEGER NOT NULL,
            can_complete INTEGER NOT NULL,
            completed_at INTEGER,
            created_at INTEGER NOT NULL,
            status_changed_at INTEGER NOT NULL
        );

        -- Immutable audit trail
        CREATE TABLE audit_events (
            event_id TEXT PRIMARY KEY,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            entity_kind TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            subject_kind TEXT,
            subject_id TEXT,
            before_state TEXT,
            after_state TEXT,
            at INTEGER NOT NULL
        );

        -- Uniqueness over active rows only
        CREATE UNIQUE INDEX idx_grants_active
            ON entity_grants(entity_kind, entity_id, subject_kind, subject_id)
            WHERE revoked_at IS NULL;
        CREATE UNIQUE INDEX idx_projections_active
            ON projections(item_kind, item_id, subject_id)
            WHERE status IN ('pending', 'accepted');

        -- Indexes for common queries
        CREATE INDEX idx_groups_container ON groups(container_id);
        CREATE INDEX idx_members_user ON group_members(user_id);
        CREATE INDEX idx_grants_entity ON entity_grants(entity_kind, entity_id);
        CREATE INDEX idx_grants_subject ON entity_grants(subject_kind, subject_id);
        CREATE INDEX idx_projections_item ON projections(item_kind, item_id);
        CREATE INDEX idx_projections_subject ON projections(subject_id);
        CREATE INDEX idx_audit_entity ON audit_events(entity_kind, entity_id);
        CREATE INDEX idx_audit_at ON audit_events(at);
        "#,
    )?;

    Ok(())
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

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"groups".to_string()));
        assert!(tables.contains(&"group_members".to_string()));
        assert!(tables.contains(&"entity_grants".to_string()));
        assert!(tables.contains(&"creator_revocations".to_string()));
        assert!(tables.contains(&"projections".to_string()));
        assert!(tables.contains(&"audit_events".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap(); // Should not error
        migrate(&mut conn).unwrap(); // Still should not error

        let version: u32 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_active_grant_uniqueness_is_partial() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let insert = "INSERT INTO entity_grants
            (entity_kind, entity_id, subject_kind, subject_id, role, created_by, created_at, revoked_at)
            VALUES ('task', 't-1', 'user', 'u-1', 'viewer', 'u-0', 1, ?1)";

        // Revoked row, then an active row for the same tuple: allowed.
        conn.execute(insert, rusqlite::params![Some(2i64)]).unwrap();
        conn.execute(insert, rusqlite::params![None::<i64>]).unwrap();

        // A second active row violates the partial index.
        assert!(conn.execute(insert, rusqlite::params![None::<i64>]).is_err());
    }
}
