//! Opening the case store: pragmas, migrations and lifetimes.

use super::migrations;
use crate::Error;
use chrono::Duration;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;
     PRAGMA busy_timeout=5000;";

/// Result cache, pending-session store and query log in one SQLite file.
///
/// Clones share one tokio-rusqlite connection thread.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
    pub(crate) result_ttl: Duration,
    pub(crate) session_ttl: Duration,
}

impl CacheDb {
    /// Open or create the store at `path` and migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::prepare(conn).await
    }

    /// Private in-memory store, used by tests.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::prepare(conn).await
    }

    async fn prepare(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn, result_ttl: Duration::hours(24), session_ttl: Duration::minutes(10) })
    }

    /// Lifetimes for cached results and pending CAPTCHA sessions.
    pub fn with_ttl(mut self, result_ttl: Duration, session_ttl: Duration) -> Self {
        self.result_ttl = result_ttl;
        self.session_ttl = session_ttl;
        self
    }

    pub fn result_ttl(&self) -> Duration {
        self.result_ttl
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_applies_pragmas() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (foreign_keys, busy_timeout) = db
            .conn
            .call(|conn| -> Result<(i64, i64), tokio_rusqlite::rusqlite::Error> {
                let fk = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
                let busy = conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0))?;
                Ok((fk, busy))
            })
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);
        assert_eq!(busy_timeout, 5000);
    }

    #[tokio::test]
    async fn test_default_ttls() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert_eq!(db.result_ttl(), Duration::hours(24));
        assert_eq!(db.session_ttl(), Duration::minutes(10));

        let db = db.with_ttl(Duration::hours(1), Duration::minutes(2));
        assert_eq!(db.result_ttl(), Duration::hours(1));
        assert_eq!(db.session_ttl(), Duration::minutes(2));
    }
}
