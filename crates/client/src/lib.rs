//! Engine code for courtfetch.
//!
//! This crate provides the browser driver adapter, the portal form flow,
//! CAPTCHA suspension, result parsing and the query orchestrator shared by
//! the server.

pub mod browser;
pub mod captcha;
pub mod orchestrator;
pub mod parse;
pub mod portal;
pub mod probe;

#[cfg(feature = "render")]
pub use browser::{ChromeConfig, ChromeDriver};
pub use browser::{BrowserDriver, BrowserSession, DriverError, FixtureOptions, FixturePortal};
pub use captcha::{CaptchaFound, Detection, detect_captcha};
pub use orchestrator::{Orchestrator, RetryPolicy};
pub use parse::{ParseError, ResultParser};
pub use portal::{PageState, PortalFlow};
pub use probe::{FetchedDocument, PortalProbe, PortalStatus, ProbeReport};
