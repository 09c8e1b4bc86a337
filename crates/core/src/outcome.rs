//! Orchestration outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, ErrorKind, ParsedRecord};

/// Result of `submit` or `resume`.
///
/// `ManualActionRequired` is a normal suspension, not an error: the caller
/// shows the image to a person and later calls resume with their answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ready { record: ParsedRecord },
    ManualActionRequired { challenge: CaptchaChallenge },
    Failed { failure: Failure },
}

impl Outcome {
    pub fn ready(record: ParsedRecord) -> Self {
        Outcome::Ready { record }
    }

    pub fn manual(challenge: CaptchaChallenge) -> Self {
        Outcome::ManualActionRequired { challenge }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Outcome::Failed { failure: Failure { kind, message: message.into() } }
    }

    /// Short label stored in the query log.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Ready { .. } => "ready",
            Outcome::ManualActionRequired { .. } => "manual_action_required",
            Outcome::Failed { .. } => "failed",
        }
    }

    pub fn record(&self) -> Option<&ParsedRecord> {
        match self {
            Outcome::Ready { record } => Some(record),
            _ => None,
        }
    }

    pub fn challenge(&self) -> Option<&CaptchaChallenge> {
        match self {
            Outcome::ManualActionRequired { challenge } => Some(challenge),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Failed { failure } => Some(failure),
            _ => None,
        }
    }
}

impl From<Error> for Outcome {
    fn from(err: Error) -> Self {
        Outcome::Failed { failure: err.into() }
    }
}

/// A classified terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Failure { kind: err.kind(), message: err.to_string() }
    }
}

/// Captured CAPTCHA image, opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaImage {
    pub content_type: String,
    pub data: Vec<u8>,
}

impl CaptchaImage {
    pub fn png(data: Vec<u8>) -> Self {
        Self { content_type: "image/png".into(), data }
    }
}

/// A pending CAPTCHA the caller must hand to a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaChallenge {
    /// Single-use resume token.
    pub token: String,
    pub image: CaptchaImage,
    pub captured_at: DateTime<Utc>,
    /// After this instant resume reports an expired session.
    pub expires_at: DateTime<Utc>,
}
