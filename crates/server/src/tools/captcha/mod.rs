//! CAPTCHA-related MCP tools.
//!
//! This module provides tools for answering or giving up on a suspended search.

pub mod abandon;
pub mod solve;

pub use abandon::{CaptchaAbandonParams, abandon_impl};
pub use solve::{CaptchaSolveParams, solve_impl};
