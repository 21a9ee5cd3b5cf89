//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.
//! Timestamps are RFC 3339 UTC text with a fixed precision, so range
//! comparisons on them are plain string comparisons.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: users, activities and derived snapshots
    r#"
    -- ============================================
    -- Source of truth
    -- ============================================

    CREATE TABLE IF NOT EXISTS users (
        id                  TEXT PRIMARY KEY,
        display_name        TEXT,
        predictions_enabled INTEGER NOT NULL DEFAULT 1,
        created_at          DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS activities (
        id               TEXT PRIMARY KEY,
        user_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        category         TEXT NOT NULL,
        started_at       DATETIME NOT NULL,
        duration_minutes REAL NOT NULL,
        source           TEXT NOT NULL,
        confidence       REAL NOT NULL DEFAULT 1.0
    );

    CREATE INDEX IF NOT EXISTS idx_activities_user_time ON activities(user_id, started_at);

    -- ============================================
    -- Derived caches (regenerable)
    -- ============================================

    CREATE TABLE IF NOT EXISTS pattern_snapshots (
        user_id     TEXT PRIMARY KEY,
        snapshot    JSON NOT NULL,
        analyzed_at DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS correlation_snapshots (
        user_id     TEXT PRIMARY KEY,
        analysis    JSON NOT NULL,
        analyzed_at DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS prediction_snapshots (
        user_id     TEXT PRIMARY KEY,
        snapshot    JSON NOT NULL,
        analyzed_at DATETIME NOT NULL
    );
    "#,
    // Version 2: user-facing suggestions and notifications
    r#"
    CREATE TABLE IF NOT EXISTS suggestions (
        id               TEXT PRIMARY KEY,
        user_id          TEXT NOT NULL,
        suggestion_type  TEXT NOT NULL,
        category         TEXT NOT NULL,
        title            TEXT NOT NULL,
        message          TEXT NOT NULL,
        priority         TEXT NOT NULL,
        timing           TEXT NOT NULL,
        confidence       REAL NOT NULL,
        action_type      TEXT NOT NULL DEFAULT 'log_activity',
        created_at       DATETIME NOT NULL,
        expires_at       DATETIME NOT NULL,
        is_read          INTEGER NOT NULL DEFAULT 0,
        is_acted_on      INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_suggestions_user_expiry ON suggestions(user_id, expires_at);

    -- At most one active suggestion per (type, category, timing)
    CREATE UNIQUE INDEX IF NOT EXISTS idx_suggestions_active
        ON suggestions(user_id, suggestion_type, category, timing)
        WHERE is_read = 0 AND is_acted_on = 0;

    CREATE TABLE IF NOT EXISTS notifications (
        id                TEXT PRIMARY KEY,
        user_id           TEXT NOT NULL,
        notification_type TEXT NOT NULL,
        title             TEXT NOT NULL,
        message           TEXT NOT NULL,
        action_data       JSON NOT NULL,
        read              INTEGER NOT NULL DEFAULT 0,
        created_at        DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_notifications_user_type
        ON notifications(user_id, notification_type, created_at);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "users",
            "activities",
            "pattern_snapshots",
            "correlation_snapshots",
            "prediction_snapshots",
            "suggestions",
            "notifications",
        ];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_activities_reference_users() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        run_migrations(&conn).unwrap();

        let referenced: Vec<String> = conn
            .prepare("PRAGMA foreign_key_list(activities)")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(2))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert_eq!(referenced, vec!["users".to_string()]);

        let orphan = conn.execute(
            "INSERT INTO activities (id, user_id, category, started_at, duration_minutes, source)
             VALUES ('a1', 'ghost', 'exercise', '2026-01-01T00:00:00.000000Z', 30.0, 'manual')",
            [],
        );
        assert!(orphan.is_err());
    }
}
