//! Unified error types for courtfetch.
//!
//! `Error` is what library calls return. `ErrorKind` is the classified,
//! serializable failure carried inside [`Outcome::Failed`](crate::Outcome).

use rmcp::model::{ErrorCode, ErrorData as McpError};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite;

/// Unified error types for the courtfetch engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid tool or API input (e.g., empty token).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Query fields rejected before any browser work.
    #[error("INVALID_QUERY: {0}")]
    InvalidQuery(String),

    /// Browser automation failed after exhausting retries.
    #[error("FETCH_FAILED: {0}")]
    FetchFailed(String),

    /// CAPTCHA detected but its image or input could not be read.
    #[error("CAPTCHA_EXTRACTION: {0}")]
    CaptchaExtraction(String),

    /// Result page missing mandatory fields or of unknown shape.
    #[error("PARSE_FAILED: {0}")]
    ParseFailed(String),

    /// The portal reported that no such case exists.
    #[error("CASE_NOT_FOUND: {0}")]
    CaseNotFound(String),

    /// Resume against an unknown, consumed or expired token.
    #[error("SESSION_EXPIRED: {0}")]
    SessionExpired(String),

    /// No cache entry found for the given fingerprint.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored JSON could not be encoded or decoded.
    #[error("CACHE_ERROR: serialization failed: {0}")]
    Serialization(String),
}

/// Classified failure kinds surfaced to callers through `Outcome::Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidQuery,
    FetchError,
    CaptchaExtractionError,
    ParseError,
    CaseNotFound,
    SessionExpiredError,
    CacheUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidQuery => "invalid_query",
            ErrorKind::FetchError => "fetch_error",
            ErrorKind::CaptchaExtractionError => "captcha_extraction_error",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::CaseNotFound => "case_not_found",
            ErrorKind::SessionExpiredError => "session_expired_error",
            ErrorKind::CacheUnavailable => "cache_unavailable",
        }
    }

    /// Parse the label stored in the query log.
    pub fn from_label(label: &str) -> Option<Self> {
        [
            ErrorKind::InvalidQuery,
            ErrorKind::FetchError,
            ErrorKind::CaptchaExtractionError,
            ErrorKind::ParseError,
            ErrorKind::CaseNotFound,
            ErrorKind::SessionExpiredError,
            ErrorKind::CacheUnavailable,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == label)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error for an `Outcome::Failed`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) | Error::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Error::FetchFailed(_) => ErrorKind::FetchError,
            Error::CaptchaExtraction(_) => ErrorKind::CaptchaExtractionError,
            Error::ParseFailed(_) => ErrorKind::ParseError,
            Error::CaseNotFound(_) => ErrorKind::CaseNotFound,
            Error::SessionExpired(_) => ErrorKind::SessionExpiredError,
            Error::CacheMiss(_) | Error::Database(_) | Error::MigrationFailed(_) | Error::Serialization(_) => {
                ErrorKind::CacheUnavailable
            }
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidQuery(msg) => (-32602, msg.clone()),
            Error::FetchFailed(msg) => (-32006, msg.clone()),
            Error::CaptchaExtraction(msg) => (-32013, msg.clone()),
            Error::ParseFailed(msg) => (-32000, msg.clone()),
            Error::CaseNotFound(msg) => (-32014, msg.clone()),
            Error::SessionExpired(msg) => (-32015, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::Serialization(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
