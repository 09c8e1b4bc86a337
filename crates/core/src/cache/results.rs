//! Parsed case results keyed by query fingerprint.
//!
//! Entries are only ever written from a fully parsed record and are
//! invisible to readers once `expires_at` has passed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::{parse_timestamp, timestamp};
use crate::{Error, Fingerprint, ParsedRecord};

/// A cached record together with its freshness window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResult {
    pub fingerprint: Fingerprint,
    pub record: ParsedRecord,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheDb {
    /// Fresh cached record for the fingerprint.
    pub async fn get_case(&self, fingerprint: &Fingerprint) -> Result<Option<CachedResult>, Error> {
        self.get_case_at(fingerprint, Utc::now()).await
    }

    pub async fn get_case_at(
        &self, fingerprint: &Fingerprint, now: DateTime<Utc>,
    ) -> Result<Option<CachedResult>, Error> {
        let key = fingerprint.as_str().to_string();
        let now = timestamp(&now);
        let row = self
            .conn
            .call(move |conn| -> Result<Option<(String, String, String)>, Error> {
                let result = conn.query_row(
                    "SELECT record_json, fetched_at, expires_at FROM case_results
                     WHERE fingerprint = ?1 AND expires_at > ?2",
                    params![key, now],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                );

                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((record_json, fetched_at, expires_at)) = row else {
            return Ok(None);
        };

        Ok(Some(CachedResult {
            fingerprint: fingerprint.clone(),
            record: serde_json::from_str(&record_json)?,
            fetched_at: parse_timestamp(&fetched_at)?,
            expires_at: parse_timestamp(&expires_at)?,
        }))
    }

    /// Insert or replace the cached record for the fingerprint.
    pub async fn put_case(&self, fingerprint: &Fingerprint, record: &ParsedRecord) -> Result<(), Error> {
        self.put_case_at(fingerprint, record, Utc::now()).await
    }

    pub async fn put_case_at(
        &self, fingerprint: &Fingerprint, record: &ParsedRecord, now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let key = fingerprint.as_str().to_string();
        let record_json = serde_json::to_string(record)?;
        let case_type = record.case_type.clone();
        let case_number = record.case_number;
        let filing_year = record.filing_year;
        let fetched_at = timestamp(&now);
        let expires_at = timestamp(&(now + self.result_ttl));

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO case_results (
                    fingerprint, case_type, case_number, filing_year,
                    record_json, fetched_at, expires_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(fingerprint) DO UPDATE SET
                    case_type = excluded.case_type,
                    case_number = excluded.case_number,
                    filing_year = excluded.filing_year,
                    record_json = excluded.record_json,
                    fetched_at = excluded.fetched_at,
                    expires_at = excluded.expires_at",
                    params![key, case_type, case_number, filing_year, record_json, fetched_at, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one cached record. Returns whether it existed.
    pub async fn delete_case(&self, fingerprint: &Fingerprint) -> Result<bool, Error> {
        let key = fingerprint.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM case_results WHERE fingerprint = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete expired results.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired_results(&self) -> Result<u64, Error> {
        self.purge_expired_results_at(Utc::now()).await
    }

    pub async fn purge_expired_results_at(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let now = timestamp(&now);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM case_results WHERE expires_at <= ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete results fetched more than `days` days ago.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_results_older_than(&self, days: u32) -> Result<u64, Error> {
        let cutoff = timestamp(&(Utc::now() - Duration::days(i64::from(days))));
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM case_results WHERE fetched_at < ?1", params![cutoff])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge oldest entries until count <= max_entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_results_lru(&self, max_entries: usize) -> Result<u64, Error> {
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM case_results", [], |row| row.get(0))?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM case_results WHERE fingerprint IN (
                    SELECT fingerprint FROM case_results ORDER BY fetched_at ASC LIMIT ?1
                )",
                    params![to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of stored results, fresh or not.
    pub async fn count_results(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM case_results", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
