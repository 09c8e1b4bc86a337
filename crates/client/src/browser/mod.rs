//! Browser Driver Adapter.
//!
//! The orchestrator drives the portal only through these two traits. A
//! `BrowserDriver` opens, restores and tears down sessions; a
//! `BrowserSession` is one isolated browser tab bound to one query.
//!
//! Implementations:
//! - [`ChromeDriver`]: headless Chrome/Chromium via chromiumoxide (feature `render`)
//! - [`FixturePortal`]: deterministic in-memory portal for demo mode and tests

#[cfg(feature = "render")]
pub mod chrome;
pub mod fixture;

use std::time::Duration;

use async_trait::async_trait;
use courtfetch_core::{CaptchaImage, Error, SessionHandle};
use thiserror::Error;

#[cfg(feature = "render")]
pub use chrome::{ChromeConfig, ChromeDriver};
pub use fixture::{FixtureOptions, FixturePortal};

/// Browser-level faults. Every variant is transient: the orchestrator
/// retries it with a fresh session.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Failed to launch or connect to browser.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// Failed to navigate to URL.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// A bounded wait ran out.
    #[error("timed out after {ms}ms waiting for {what}")]
    Timeout { what: String, ms: u64 },

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("script failed: {0}")]
    Script(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    /// The stored handle no longer points at a live browser.
    #[error("browser session lost: {0}")]
    SessionLost(String),

    /// Browser closed unexpectedly.
    #[error("browser closed unexpectedly")]
    Closed,
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Self {
        Error::FetchFailed(err.to_string())
    }
}

/// Opens, rehydrates and tears down browser sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Short name recorded in every handle this driver produces.
    fn name(&self) -> &'static str;

    /// Start a fresh, isolated session.
    async fn open(&self) -> Result<Box<dyn BrowserSession>, DriverError>;

    /// Continue the session a handle points at, on the same server-side
    /// interaction.
    async fn restore(&self, handle: &SessionHandle) -> Result<Box<dyn BrowserSession>, DriverError>;

    /// Tear down the browser behind a handle. Unknown handles are a no-op.
    async fn release(&self, handle: &SessionHandle) -> Result<(), DriverError>;
}

/// One live browser tab.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Current page HTML.
    async fn content(&self) -> Result<String, DriverError>;

    /// Set the value of a text input (also used to inject a CAPTCHA answer).
    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError>;

    /// Choose a `<select>` option by its value attribute.
    async fn select_option(&self, selector: &str, value: &str) -> Result<(), DriverError>;

    /// Click an element and let any resulting navigation settle.
    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    async fn screenshot_element(&self, selector: &str) -> Result<CaptchaImage, DriverError>;

    /// Serializable pointer to this session, enough to `restore` it later.
    async fn handle(&self) -> Result<SessionHandle, DriverError>;
}

/// Poll the page until `probe` yields a value or `timeout` elapses.
pub async fn wait_for<T, F>(
    session: &dyn BrowserSession, timeout: Duration, what: &str, mut probe: F,
) -> Result<T, DriverError>
where
    F: FnMut(&str) -> Option<T> + Send,
    T: Send,
{
    let poll = async {
        loop {
            let html = session.content().await?;
            if let Some(found) = probe(&html) {
                return Ok::<T, DriverError>(found);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout { what: what.to_string(), ms: timeout.as_millis() as u64 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_is_fetch_failure() {
        let err: Error = DriverError::Timeout { what: "search form".into(), ms: 500 }.into();
        assert!(matches!(err, Error::FetchFailed(_)));
        assert!(err.to_string().contains("search form"));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let portal = FixturePortal::new(FixtureOptions::default());
        let session = portal.open().await.unwrap();
        let result: Result<(), _> =
            wait_for(session.as_ref(), Duration::from_millis(300), "never", |_| None).await;
        assert!(matches!(result, Err(DriverError::Timeout { ms: 300, .. })));
    }

    #[tokio::test]
    async fn test_wait_for_returns_probe_value() {
        let portal = FixturePortal::new(FixtureOptions::default());
        let session = portal.open().await.unwrap();
        session.navigate("https://portal.test/case-status").await.unwrap();
        let found = wait_for(session.as_ref(), Duration::from_secs(1), "form", |html| {
            html.contains("<form").then_some(42)
        })
        .await
        .unwrap();
        assert_eq!(found, 42);
    }
}
