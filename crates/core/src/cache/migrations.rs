//! Schema migrations for the case store.
//!
//! Applied versions are recorded in `_migrations`; each pending script runs
//! in its own transaction together with its version row.

use super::Error;
use tokio_rusqlite::{Connection, params, rusqlite};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Applied in ascending `version` order.
const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "case_results", sql: include_str!("../../migrations/001_case_results.sql") },
    Migration {
        version: 2,
        name: "pending_sessions",
        sql: include_str!("../../migrations/002_pending_sessions.sql"),
    },
    Migration { version: 3, name: "query_log", sql: include_str!("../../migrations/003_query_log.sql") },
];

fn current_version(conn: &rusqlite::Connection) -> Result<i64, Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;
    Ok(version)
}

fn apply(conn: &mut rusqlite::Connection, migration: &Migration) -> Result<(), Error> {
    let failed = |e: rusqlite::Error| Error::MigrationFailed(format!("{} ({}): {e}", migration.version, migration.name));

    let tx = conn.transaction().map_err(failed)?;
    tx.execute_batch(migration.sql).map_err(failed)?;
    tx.execute(
        "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        params![migration.version, migration.name, super::timestamp(&chrono::Utc::now())],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

/// Bring the schema up to the newest version.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the script that failed; earlier
/// scripts stay applied.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let current = current_version(conn)?;
        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            apply(conn, migration)?;
            tracing::debug!(version = migration.version, name = migration.name, "applied migration");
        }
        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn applied(conn: &Connection) -> Vec<(i64, String)> {
        conn.call(|conn| -> Result<Vec<(i64, String)>, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT version, name FROM _migrations ORDER BY version")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let tables: i64 = conn
            .call(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
                     AND name IN ('case_results', 'pending_sessions', 'query_log')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();

        assert_eq!(tables, 3);
        assert_eq!(applied(&conn).await.len(), MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_upgrades_from_older_schema() {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.call(|conn| -> Result<(), Error> {
            current_version(conn)?;
            apply(conn, &MIGRATIONS[0])
        })
        .await
        .unwrap();

        run(&conn).await.unwrap();

        let versions = applied(&conn).await;
        assert_eq!(
            versions,
            vec![(1, "case_results".to_string()), (2, "pending_sessions".to_string()), (3, "query_log".to_string())]
        );
    }
}
