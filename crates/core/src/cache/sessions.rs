//! Pending CAPTCHA sessions keyed by single-use token.
//!
//! A token is live from creation until `expires_at` or until someone takes
//! it, whichever comes first. Take and consume run inside one transaction,
//! so two resumers racing on the same token cannot both win.

use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::{parse_timestamp, timestamp};
use crate::session::mint_token;
use crate::{CaptchaImage, Error, Fingerprint, PendingSession, Query, SessionHandle};

const SESSION_COLUMNS: &str =
    "token, fingerprint, query_json, handle_json, image_content_type, image, created_at, expires_at";

/// A pending_sessions row before JSON and timestamp decoding.
struct SessionRow {
    token: String,
    fingerprint: String,
    query_json: String,
    handle_json: String,
    image_content_type: String,
    image: Vec<u8>,
    created_at: String,
    expires_at: String,
}

impl SessionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            token: row.get(0)?,
            fingerprint: row.get(1)?,
            query_json: row.get(2)?,
            handle_json: row.get(3)?,
            image_content_type: row.get(4)?,
            image: row.get(5)?,
            created_at: row.get(6)?,
            expires_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<PendingSession, Error> {
        Ok(PendingSession {
            token: self.token,
            fingerprint: Fingerprint::from_hex(&self.fingerprint)?,
            query: serde_json::from_str(&self.query_json)?,
            handle: serde_json::from_str(&self.handle_json)?,
            image: CaptchaImage { content_type: self.image_content_type, data: self.image },
            created_at: parse_timestamp(&self.created_at)?,
            expires_at: parse_timestamp(&self.expires_at)?,
        })
    }
}

fn select_one(conn: &rusqlite::Connection, sql: &str, key: &str, now: Option<&str>) -> Result<Option<SessionRow>, Error> {
    let result = match now {
        Some(now) => conn.query_row(sql, params![key, now], SessionRow::from_row),
        None => conn.query_row(sql, params![key], SessionRow::from_row),
    };

    match result {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl CacheDb {
    /// Store a new pending session under a freshly minted token.
    pub async fn create_session(
        &self, query: &Query, handle: &SessionHandle, image: &CaptchaImage,
    ) -> Result<PendingSession, Error> {
        self.create_session_at(query, handle, image, Utc::now()).await
    }

    pub async fn create_session_at(
        &self, query: &Query, handle: &SessionHandle, image: &CaptchaImage, now: DateTime<Utc>,
    ) -> Result<PendingSession, Error> {
        let session = PendingSession {
            token: mint_token(),
            fingerprint: query.fingerprint(),
            query: query.clone(),
            handle: handle.clone(),
            image: image.clone(),
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        let token = session.token.clone();
        let fingerprint = session.fingerprint.as_str().to_string();
        let query_json = serde_json::to_string(&session.query)?;
        let handle_json = serde_json::to_string(&session.handle)?;
        let content_type = session.image.content_type.clone();
        let data = session.image.data.clone();
        let created_at = timestamp(&session.created_at);
        let expires_at = timestamp(&session.expires_at);

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    &format!("INSERT INTO pending_sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                    params![token, fingerprint, query_json, handle_json, content_type, data, created_at, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(session)
    }

    /// Live session for the token.
    pub async fn get_session(&self, token: &str) -> Result<Option<PendingSession>, Error> {
        self.get_session_at(token, Utc::now()).await
    }

    pub async fn get_session_at(&self, token: &str, now: DateTime<Utc>) -> Result<Option<PendingSession>, Error> {
        let token = token.to_string();
        let now = timestamp(&now);
        let row = self
            .conn
            .call(move |conn| -> Result<Option<SessionRow>, Error> {
                select_one(
                    conn,
                    &format!("SELECT {SESSION_COLUMNS} FROM pending_sessions WHERE token = ?1 AND expires_at > ?2"),
                    &token,
                    Some(&now),
                )
            })
            .await
            .map_err(Error::from)?;

        row.map(SessionRow::decode).transpose()
    }

    /// Newest live session waiting on the fingerprint.
    pub async fn find_session(&self, fingerprint: &Fingerprint) -> Result<Option<PendingSession>, Error> {
        self.find_session_at(fingerprint, Utc::now()).await
    }

    pub async fn find_session_at(
        &self, fingerprint: &Fingerprint, now: DateTime<Utc>,
    ) -> Result<Option<PendingSession>, Error> {
        let key = fingerprint.as_str().to_string();
        let now = timestamp(&now);
        let row = self
            .conn
            .call(move |conn| -> Result<Option<SessionRow>, Error> {
                select_one(
                    conn,
                    &format!(
                        "SELECT {SESSION_COLUMNS} FROM pending_sessions
                         WHERE fingerprint = ?1 AND expires_at > ?2
                         ORDER BY created_at DESC LIMIT 1"
                    ),
                    &key,
                    Some(&now),
                )
            })
            .await
            .map_err(Error::from)?;

        row.map(SessionRow::decode).transpose()
    }

    /// Remove and return the session, whether or not it has expired.
    pub async fn take_session(&self, token: &str) -> Result<Option<PendingSession>, Error> {
        let token = token.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<SessionRow>, Error> {
                let tx = conn.transaction()?;
                let row = select_one(
                    &tx,
                    &format!("SELECT {SESSION_COLUMNS} FROM pending_sessions WHERE token = ?1"),
                    &token,
                    None,
                )?;
                if row.is_some() {
                    tx.execute("DELETE FROM pending_sessions WHERE token = ?1", params![token])?;
                }
                tx.commit()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        row.map(SessionRow::decode).transpose()
    }

    /// Remove a live session. Returns false for unknown, consumed or
    /// expired tokens.
    pub async fn consume_session(&self, token: &str) -> Result<bool, Error> {
        self.consume_session_at(token, Utc::now()).await
    }

    pub async fn consume_session_at(&self, token: &str, now: DateTime<Utc>) -> Result<bool, Error> {
        let token = token.to_string();
        let now = timestamp(&now);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM pending_sessions WHERE token = ?1 AND expires_at > ?2",
                    params![token, now],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete expired sessions and return their browser handles.
    pub async fn purge_expired_sessions(&self) -> Result<Vec<SessionHandle>, Error> {
        self.purge_expired_sessions_at(Utc::now()).await
    }

    pub async fn purge_expired_sessions_at(&self, now: DateTime<Utc>) -> Result<Vec<SessionHandle>, Error> {
        let now = timestamp(&now);
        let raw = self
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let handles = {
                    let mut stmt = tx.prepare("SELECT handle_json FROM pending_sessions WHERE expires_at <= ?1")?;
                    let rows = stmt.query_map(params![now], |row| row.get::<_, String>(0))?;
                    rows.collect::<Result<Vec<_>, _>>()?
                };
                tx.execute("DELETE FROM pending_sessions WHERE expires_at <= ?1", params![now])?;
                tx.commit()?;
                Ok(handles)
            })
            .await
            .map_err(Error::from)?;

        let mut handles = Vec::with_capacity(raw.len());
        for json in raw {
            match serde_json::from_str::<SessionHandle>(&json) {
                Ok(handle) => handles.push(handle),
                Err(e) => tracing::warn!(error = %e, "dropping undecodable session handle"),
            }
        }
        Ok(handles)
    }

    /// Number of sessions still awaiting an answer.
    pub async fn count_active_sessions(&self) -> Result<u64, Error> {
        let now = timestamp(&Utc::now());
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM pending_sessions WHERE expires_at > ?1",
                    params![now],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
