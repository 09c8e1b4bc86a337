//! Storage contracts the engine depends on.
//!
//! The orchestrator only sees these traits. `CacheDb` implements all three
//! on one SQLite file; any other durable medium honoring the same rules can
//! stand in.

use async_trait::async_trait;

use crate::cache::{CachedResult, NewQueryLog};
use crate::{CacheDb, CaptchaImage, Error, Fingerprint, ParsedRecord, PendingSession, Query, SessionHandle};

/// TTL-bounded cache of parsed records.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Fresh entry for the fingerprint; expired entries are reported as absent.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CachedResult>, Error>;

    /// Store a fully parsed record, replacing any previous entry.
    async fn put(&self, fingerprint: &Fingerprint, record: &ParsedRecord) -> Result<(), Error>;
}

/// Token-keyed store of suspended browser sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new pending session under a freshly minted token.
    async fn create(&self, query: &Query, handle: &SessionHandle, image: &CaptchaImage)
    -> Result<PendingSession, Error>;

    /// Live session for the token; never returns an expired one.
    async fn get(&self, token: &str) -> Result<Option<PendingSession>, Error>;

    /// Live session already waiting on a person for this fingerprint.
    async fn find_active(&self, fingerprint: &Fingerprint) -> Result<Option<PendingSession>, Error>;

    /// Atomically remove and return the session, expired or not.
    ///
    /// Exactly one caller can take a given token.
    async fn take(&self, token: &str) -> Result<Option<PendingSession>, Error>;

    /// Remove the session. Returns false when the token was unknown,
    /// already consumed or expired.
    async fn consume(&self, token: &str) -> Result<bool, Error>;

    /// Remove expired sessions, returning their handles for teardown.
    async fn purge_expired(&self) -> Result<Vec<SessionHandle>, Error>;
}

/// Append-only record of terminal orchestration results.
#[async_trait]
pub trait QueryJournal: Send + Sync {
    async fn record(&self, entry: NewQueryLog) -> Result<(), Error>;
}

#[async_trait]
impl ResultCache for CacheDb {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CachedResult>, Error> {
        self.get_case(fingerprint).await
    }

    async fn put(&self, fingerprint: &Fingerprint, record: &ParsedRecord) -> Result<(), Error> {
        self.put_case(fingerprint, record).await
    }
}

#[async_trait]
impl SessionStore for CacheDb {
    async fn create(
        &self, query: &Query, handle: &SessionHandle, image: &CaptchaImage,
    ) -> Result<PendingSession, Error> {
        self.create_session(query, handle, image).await
    }

    async fn get(&self, token: &str) -> Result<Option<PendingSession>, Error> {
        self.get_session(token).await
    }

    async fn find_active(&self, fingerprint: &Fingerprint) -> Result<Option<PendingSession>, Error> {
        self.find_session(fingerprint).await
    }

    async fn take(&self, token: &str) -> Result<Option<PendingSession>, Error> {
        self.take_session(token).await
    }

    async fn consume(&self, token: &str) -> Result<bool, Error> {
        self.consume_session(token).await
    }

    async fn purge_expired(&self) -> Result<Vec<SessionHandle>, Error> {
        self.purge_expired_sessions().await
    }
}

#[async_trait]
impl QueryJournal for CacheDb {
    async fn record(&self, entry: NewQueryLog) -> Result<(), Error> {
        self.log_query(&entry).await
    }
}
