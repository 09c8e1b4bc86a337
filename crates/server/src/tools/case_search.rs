//! case_search tool implementation.
//!
//! Validates the raw form fields and hands them to the orchestrator.

use courtfetch_client::Orchestrator;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{NumberOrText, outcome_result};

/// Parameters for the case_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaseSearchParams {
    /// Case type as shown in the portal dropdown, e.g. "W.P.(C)" or "Writ Petition".
    pub case_type: String,

    /// Case number, a positive integer.
    pub case_number: NumberOrText,

    /// Filing year, 1950 through the current year.
    pub filing_year: NumberOrText,
}

/// Implementation of the case_search tool.
pub async fn search_impl(orchestrator: &Orchestrator, params: CaseSearchParams) -> Result<CallToolResult, McpError> {
    let outcome = orchestrator
        .submit_form(&params.case_type, &params.case_number.as_text(), &params.filing_year.as_text())
        .await;
    outcome_result(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing;

    fn params(case_type: &str, number: NumberOrText, year: NumberOrText) -> CaseSearchParams {
        CaseSearchParams { case_type: case_type.into(), case_number: number, filing_year: year }
    }

    #[tokio::test]
    async fn test_search_ready() {
        let state = testing::state(None).await;
        let result = search_impl(
            &state.orchestrator,
            params("Writ Petition", NumberOrText::Number(1234), NumberOrText::Number(2022)),
        )
        .await
        .unwrap();

        assert_eq!(result.is_error, Some(false));
        let body = testing::json(&result);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["record"]["case_number"], 1234);
        assert_eq!(body["record"]["filing_year"], 2022);
    }

    #[tokio::test]
    async fn test_search_suspends_on_captcha() {
        let state = testing::state(Some("ABC123")).await;
        let result = search_impl(
            &state.orchestrator,
            params("Civil Appeal", NumberOrText::Text("0042".into()), NumberOrText::Text("2020".into())),
        )
        .await
        .unwrap();

        assert_eq!(result.content.len(), 2);
        let body = testing::json(&result);
        assert_eq!(body["status"], "manual_action_required");
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[tokio::test]
    async fn test_search_rejects_bad_year() {
        let state = testing::state(None).await;
        let result = search_impl(
            &state.orchestrator,
            params("Writ Petition", NumberOrText::Number(1), NumberOrText::Number(1800)),
        )
        .await
        .unwrap();

        assert_eq!(result.is_error, Some(true));
        let body = testing::json(&result);
        assert_eq!(body["failure"]["kind"], "invalid_query");

        let history = state.db.recent_queries(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].filing_year, "1800");
    }
}
