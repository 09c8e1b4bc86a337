//! Query log: one row per terminal answer handed back to a caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

use super::connection::CacheDb;
use super::{parse_timestamp, timestamp};
use crate::{Error, ErrorKind, Outcome, Query};

/// A log row about to be written.
///
/// Query fields are kept as text so rejected input can be logged verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueryLog {
    pub case_type: String,
    pub case_number: String,
    pub filing_year: String,
    pub outcome: String,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    pub cached: bool,
}

impl NewQueryLog {
    pub fn for_outcome(query: &Query, outcome: &Outcome, cached: bool) -> Self {
        let (error_kind, message) = match outcome.failure() {
            Some(f) => (Some(f.kind), Some(f.message.clone())),
            None => (None, None),
        };
        Self {
            case_type: query.case_type().to_string(),
            case_number: query.case_number().to_string(),
            filing_year: query.filing_year().to_string(),
            outcome: outcome.label().to_string(),
            error_kind,
            message,
            cached,
        }
    }

    /// Input that never became a `Query`.
    pub fn rejected(case_type: &str, case_number: &str, filing_year: &str, err: &Error) -> Self {
        Self {
            case_type: case_type.trim().to_string(),
            case_number: case_number.trim().to_string(),
            filing_year: filing_year.trim().to_string(),
            outcome: "failed".into(),
            error_kind: Some(err.kind()),
            message: Some(err.to_string()),
            cached: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub id: i64,
    pub case_type: String,
    pub case_number: String,
    pub filing_year: String,
    pub queried_at: DateTime<Utc>,
    pub outcome: String,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    pub cached: bool,
}

/// Aggregate counts over the whole log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub total: u64,
    pub ready: u64,
    pub manual_action_required: u64,
    pub failed: u64,
    pub cache_hits: u64,
    /// Percentage of queries answered `ready`, two decimals.
    pub success_rate: f64,
    /// Stored case results, fresh or not.
    pub cached_cases: u64,
    pub last_query_at: Option<DateTime<Utc>>,
}

type LogRow = (i64, String, String, String, String, String, Option<String>, Option<String>, bool);

impl CacheDb {
    pub async fn log_query(&self, entry: &NewQueryLog) -> Result<(), Error> {
        self.log_query_at(entry, Utc::now()).await
    }

    pub async fn log_query_at(&self, entry: &NewQueryLog, now: DateTime<Utc>) -> Result<(), Error> {
        let entry = entry.clone();
        let queried_at = timestamp(&now);
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO query_log (
                    case_type, case_number, filing_year, queried_at,
                    outcome, error_kind, message, cached
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        &entry.case_type,
                        &entry.case_number,
                        &entry.filing_year,
                        queried_at,
                        &entry.outcome,
                        entry.error_kind.map(|k| k.as_str()),
                        &entry.message,
                        entry.cached as i32,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Most recent log rows, newest first.
    pub async fn recent_queries(&self, limit: usize) -> Result<Vec<QueryLogEntry>, Error> {
        let limit = limit as i64;
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<LogRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, case_type, case_number, filing_year, queried_at,
                        outcome, error_kind, message, cached
                     FROM query_log ORDER BY id DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get::<_, i32>(8)? == 1,
                    ))
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)?;

        rows.into_iter()
            .map(|(id, case_type, case_number, filing_year, queried_at, outcome, kind, message, cached)| {
                Ok(QueryLogEntry {
                    id,
                    case_type,
                    case_number,
                    filing_year,
                    queried_at: parse_timestamp(&queried_at)?,
                    outcome,
                    error_kind: kind.as_deref().and_then(ErrorKind::from_label),
                    message,
                    cached,
                })
            })
            .collect()
    }

    pub async fn query_stats(&self) -> Result<QueryStats, Error> {
        let (total, ready, manual, failed, hits, last) = self
            .conn
            .call(|conn| -> Result<(i64, i64, i64, i64, i64, Option<String>), Error> {
                let row = conn.query_row(
                    "SELECT COUNT(*),
                        COALESCE(SUM(outcome = 'ready'), 0),
                        COALESCE(SUM(outcome = 'manual_action_required'), 0),
                        COALESCE(SUM(outcome = 'failed'), 0),
                        COALESCE(SUM(cached), 0),
                        MAX(queried_at)
                     FROM query_log",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
                )?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        let success_rate = if total > 0 { (ready as f64 / total as f64 * 10_000.0).round() / 100.0 } else { 0.0 };

        Ok(QueryStats {
            total: total as u64,
            ready: ready as u64,
            manual_action_required: manual as u64,
            failed: failed as u64,
            cache_hits: hits as u64,
            success_rate,
            cached_cases: self.count_results().await?,
            last_query_at: last.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    /// Delete log rows older than `days` days.
    pub async fn purge_query_log_older_than(&self, days: u32) -> Result<u64, Error> {
        let cutoff = timestamp(&(Utc::now() - chrono::Duration::days(i64::from(days))));
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM query_log WHERE queried_at < ?1", params![cutoff])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
