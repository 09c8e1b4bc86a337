//! MCP tool implementations.
//!
//! This module contains all tools exposed by the courtfetch server, plus the
//! conversion from engine outcomes to tool results.

pub mod cache;
pub mod captcha;
pub mod case_search;
pub mod case_types;
pub mod document_fetch;
pub mod history;
pub mod portal_status;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use courtfetch_core::{Error, Outcome};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A field clients send either as a JSON number or as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(i64),
    Text(String),
}

impl NumberOrText {
    /// Text handed to query validation, which does its own parsing.
    pub fn as_text(&self) -> String {
        match self {
            NumberOrText::Number(n) => n.to_string(),
            NumberOrText::Text(s) => s.clone(),
        }
    }
}

/// Serialize `value` as the single text block of a successful result.
pub fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value).map_err(Error::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Turn an engine outcome into a tool result.
///
/// A CAPTCHA suspension is a success carrying the challenge as JSON plus the
/// image itself; a classified failure is a tool-level error so the model sees
/// the kind and message without a protocol error.
pub fn outcome_result(outcome: Outcome) -> Result<CallToolResult, McpError> {
    match &outcome {
        Outcome::Ready { .. } => json_result(&outcome),
        Outcome::ManualActionRequired { challenge } => {
            let summary = serde_json::json!({
                "status": outcome.label(),
                "token": challenge.token,
                "content_type": challenge.image.content_type,
                "captured_at": challenge.captured_at,
                "expires_at": challenge.expires_at,
                "next": "show the image to a person, then call captcha_solve with the token and their answer",
            });
            let json = serde_json::to_string_pretty(&summary).map_err(Error::from)?;
            let image = STANDARD.encode(&challenge.image.data);
            Ok(CallToolResult::success(vec![
                Content::text(json),
                Content::image(image, challenge.image.content_type.clone()),
            ]))
        }
        Outcome::Failed { .. } => {
            let json = serde_json::to_string_pretty(&outcome).map_err(Error::from)?;
            Ok(CallToolResult::error(vec![Content::text(json)]))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use courtfetch_client::{FixtureOptions, FixturePortal, Orchestrator, PortalProbe};
    use courtfetch_core::{AppConfig, CacheDb};
    use rmcp::model::CallToolResult;

    use crate::handler::AppState;

    pub fn config() -> AppConfig {
        AppConfig {
            demo_mode: true,
            fallback_urls: Vec::new(),
            step_timeout_ms: 1_000,
            retry_delay_ms: 10,
            orchestration_timeout_ms: 10_000,
            ..Default::default()
        }
    }

    /// Demo-mode state over an in-memory database.
    pub async fn state(captcha: Option<&str>) -> AppState {
        let config = config();
        let db = CacheDb::open_in_memory().await.unwrap();
        let portal = FixturePortal::new(FixtureOptions { captcha: captcha.map(str::to_string), ..Default::default() });
        let orchestrator = Arc::new(Orchestrator::new(&config, Arc::new(portal), db.clone()).unwrap());
        let probe = PortalProbe::from_config(&config).unwrap();
        AppState { orchestrator, db, probe, config }
    }

    /// The first content block's text parsed as JSON.
    pub fn json(result: &CallToolResult) -> serde_json::Value {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use chrono::Utc;
    use courtfetch_core::{CaptchaChallenge, CaptchaImage, ErrorKind};

    #[test]
    fn test_number_or_text() {
        let n: NumberOrText = serde_json::from_str("2022").unwrap();
        let s: NumberOrText = serde_json::from_str("\"0042\"").unwrap();
        assert_eq!(n.as_text(), "2022");
        assert_eq!(s.as_text(), "0042");
    }

    #[test]
    fn test_manual_action_carries_image() {
        let challenge = CaptchaChallenge {
            token: "tok".into(),
            image: CaptchaImage::png(vec![1, 2, 3]),
            captured_at: Utc::now(),
            expires_at: Utc::now(),
        };
        let result = outcome_result(Outcome::manual(challenge)).unwrap();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.content.len(), 2);

        let summary = testing::json(&result);
        assert_eq!(summary["status"], "manual_action_required");
        assert_eq!(summary["token"], "tok");

        let image = serde_json::to_value(&result.content[1]).unwrap();
        assert_eq!(image["data"], STANDARD.encode([1u8, 2, 3]));
        assert_eq!(image["mimeType"], "image/png");
    }

    #[test]
    fn test_failure_is_tool_error() {
        let result = outcome_result(Outcome::failed(ErrorKind::FetchError, "portal down")).unwrap();
        assert_eq!(result.is_error, Some(true));

        let body = testing::json(&result);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["failure"]["kind"], "fetch_error");
    }
}
