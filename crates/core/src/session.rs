//! Suspended browser sessions awaiting a CAPTCHA answer.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{CaptchaChallenge, CaptchaImage, Fingerprint, Query};

/// Serializable pointer to a live browser session.
///
/// Holds everything a driver needs to continue the same server-side
/// interaction from another worker: where the browser listens, which page
/// was open, and the cookies that page carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    /// Driver that produced the handle ("chromium", "fixture").
    pub driver: String,
    pub session_id: String,
    /// DevTools websocket endpoint, if the driver has one.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub cookies: Vec<SessionCookie>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// A stored suspension: one token, one browser session, one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSession {
    pub token: String,
    pub fingerprint: Fingerprint,
    pub query: Query,
    pub handle: SessionHandle,
    pub image: CaptchaImage,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The challenge a caller shows for this session.
    pub fn challenge(&self) -> CaptchaChallenge {
        CaptchaChallenge {
            token: self.token.clone(),
            image: self.image.clone(),
            captured_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Mint an unguessable resume token (256 random bits, hex encoded).
pub fn mint_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_token_unique() {
        let a = mint_token();
        let b = mint_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_handle_json_defaults() {
        let handle: SessionHandle = serde_json::from_str(r#"{"driver":"fixture","session_id":"s-1"}"#).unwrap();
        assert!(handle.endpoint.is_none());
        assert!(handle.cookies.is_empty());
    }
}
