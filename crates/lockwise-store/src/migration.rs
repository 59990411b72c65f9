//! Schema migration system.
//!
//! Each database file has its own ordered list of migrations.  The applied
//! version is tracked in a `_migrations` table so every migration runs
//! exactly once per file.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
pub struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    pub version: u32,
    pub description: &'static str,
    /// Raw SQL. May contain multiple statements separated by `;`.
    pub sql: &'static str,
}

/// Migrations for the shared preferences file.
pub static SETTINGS_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "settings key/value table",
    sql: r#"
            CREATE TABLE settings (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
        "#,
}];

/// Migrations for a profile's logins file.
pub static LOGINS_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "logins and meta tables",
        sql: r#"
            CREATE TABLE logins (
                id             TEXT PRIMARY KEY,
                hostname       TEXT NOT NULL,
                username       TEXT,
                password_nonce BLOB NOT NULL,
                password_enc   BLOB NOT NULL,
                created_at     INTEGER NOT NULL,
                last_used      INTEGER,
                times_used     INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX idx_logins_hostname ON logins(hostname);

            CREATE TABLE meta (
                key   TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        description: "track last password change",
        sql: r#"
            ALTER TABLE logins ADD COLUMN password_changed_at INTEGER;
        "#,
    },
];

// ── public API ───────────────────────────────────────────────────────

/// Run every migration in `migrations` newer than the file's version.
///
/// Synchronous; call it from `spawn_blocking`.
pub fn run_all(conn: &Connection, migrations: &[Migration]) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = migrations.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!(current_version = current, "database schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }

    Ok(())
}

/// Return the latest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to read current version: {e}"),
    })
}

// ── internals ────────────────────────────────────────────────────────

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })
}

/// Apply a single migration inside a transaction.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    let fail = |message: String| StoreError::Migration {
        version: migration.version,
        message,
    };

    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| fail(format!("failed to begin transaction: {e}")))?;

    let result = (|| -> StoreResult<()> {
        conn.execute_batch(migration.sql)
            .map_err(|e| fail(format!("SQL execution failed: {e}")))?;

        conn.execute(
            "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                migration.version,
                migration.description,
                chrono::Utc::now().timestamp()
            ],
        )
        .map_err(|e| fail(format!("failed to record migration: {e}")))?;

        Ok(())
    })();

    match &result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")
                .map_err(|e| fail(format!("failed to commit: {e}")))?;
        }
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
        }
    }

    result
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_ordered(migrations: &[Migration]) {
        for window in migrations.windows(2) {
            assert!(
                window[1].version > window[0].version,
                "migration versions must be strictly increasing: {} >= {}",
                window[0].version,
                window[1].version,
            );
        }
    }

    #[test]
    fn migrations_are_ordered() {
        assert_ordered(SETTINGS_MIGRATIONS);
        assert_ordered(LOGINS_MIGRATIONS);
    }

    #[test]
    fn run_all_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn, LOGINS_MIGRATIONS).unwrap();
        run_all(&conn, LOGINS_MIGRATIONS).unwrap();

        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn logins_schema_accepts_rows() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn, LOGINS_MIGRATIONS).unwrap();

        conn.execute(
            "INSERT INTO logins (id, hostname, username, password_nonce, password_enc, created_at, password_changed_at) \
             VALUES ('a', 'https://example.com', NULL, x'00', x'00', 0, 0)",
            [],
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM logins", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn broken_migration_rolls_back() {
        static BROKEN: &[Migration] = &[
            Migration {
                version: 1,
                description: "ok",
                sql: "CREATE TABLE a (x INTEGER);",
            },
            Migration {
                version: 2,
                description: "broken",
                sql: "CREATE TABLE b (x INTEGER); SELECT * FROM missing_table;",
            },
        ];

        let conn = Connection::open_in_memory().unwrap();
        let err = run_all(&conn, BROKEN).unwrap_err();
        assert!(matches!(err, StoreError::Migration { version: 2, .. }));
        assert_eq!(current_version(&conn).unwrap(), 1);

        let b_exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='b'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(b_exists, 0);
    }
}
