//! Core types and shared functionality for courtfetch.
//!
//! This crate provides:
//! - Query, fingerprint and parsed case record types
//! - Orchestration outcomes and CAPTCHA challenge types
//! - Result cache, pending-session store and query log with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod case_types;
pub mod config;
pub mod error;
pub mod outcome;
pub mod query;
pub mod record;
pub mod selectors;
pub mod session;
pub mod store;

pub use cache::{CacheDb, CachedResult, NewQueryLog, QueryLogEntry, QueryStats};
pub use config::AppConfig;
pub use error::{Error, ErrorKind};
pub use outcome::{CaptchaChallenge, CaptchaImage, Failure, Outcome};
pub use query::{Fingerprint, Query};
pub use record::{CaseDate, Document, DocumentKind, HistoryEntry, ParsedRecord, Party, PartyRole};
pub use selectors::SelectorTable;
pub use session::{PendingSession, SessionCookie, SessionHandle};
pub use store::{QueryJournal, ResultCache, SessionStore};
