//! portal_status tool implementation.
//!
//! Portal reachability plus a snapshot of the engine's own state.

use courtfetch_client::ProbeReport;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use serde::Serialize;

use crate::handler::AppState;
use crate::tools::json_result;

/// Output from the portal_status tool.
#[derive(Debug, Clone, Serialize)]
pub struct PortalStatusOutput {
    pub portal: ProbeReport,
    /// Browser driver in use ("chromium" or "fixture").
    pub driver: &'static str,
    pub demo_mode: bool,
    /// Searches currently driving or waiting for a browser.
    pub in_flight: usize,
    /// Unexpired CAPTCHA sessions waiting for an answer.
    pub pending_captchas: u64,
    pub cached_cases: u64,
}

/// Implementation of the portal_status tool.
pub async fn status_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let portal = state.probe.check().await;

    let output = PortalStatusOutput {
        portal,
        driver: state.orchestrator.driver_name(),
        demo_mode: state.config.demo_mode,
        in_flight: state.orchestrator.in_flight(),
        pending_captchas: state.db.count_active_sessions().await?,
        cached_cases: state.db.count_results().await?,
    };
    json_result(&output)
}
