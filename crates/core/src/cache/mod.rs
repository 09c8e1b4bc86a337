//! SQLite-backed storage for case results, pending CAPTCHA sessions and the
//! query log.
//!
//! This module provides a persistent store using SQLite with async access
//! via tokio-rusqlite. It supports:
//!
//! - Fingerprint-keyed result cache with a TTL (24h by default)
//! - Single-use pending sessions with a short TTL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Purge strategies (expired, age, LRU)
//!
//! All statements for one `CacheDb` run in order on a single connection
//! thread, so each call observes and leaves a key fully written.

pub mod connection;
pub mod hash;
pub mod history;
pub mod migrations;
pub mod results;
pub mod sessions;

use chrono::{DateTime, SecondsFormat, Utc};

pub use crate::Error;

pub use connection::CacheDb;
pub use history::{NewQueryLog, QueryLogEntry, QueryStats};
pub use results::CachedResult;

/// Fixed-width UTC timestamp; compares lexically in time order.
pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("bad timestamp {raw:?}: {e}")))
}
