//! captcha_solve tool implementation.
//!
//! Resumes a suspended search with a person's CAPTCHA answer.

use courtfetch_client::Orchestrator;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::outcome_result;

/// Parameters for the captcha_solve tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptchaSolveParams {
    /// Token from the case_search or captcha_solve result that showed the CAPTCHA.
    pub token: String,

    /// The characters a person read from the CAPTCHA image.
    pub solution: String,
}

/// Implementation of the captcha_solve tool.
pub async fn solve_impl(orchestrator: &Orchestrator, params: CaptchaSolveParams) -> Result<CallToolResult, McpError> {
    outcome_result(orchestrator.resume(&params.token, &params.solution).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::case_search::{CaseSearchParams, search_impl};
    use crate::tools::{NumberOrText, testing};

    async fn suspend(orchestrator: &Orchestrator) -> String {
        let params = CaseSearchParams {
            case_type: "Writ Petition".into(),
            case_number: NumberOrText::Number(1234),
            filing_year: NumberOrText::Number(2022),
        };
        let result = search_impl(orchestrator, params).await.unwrap();
        testing::json(&result)["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_solve_returns_record() {
        let state = testing::state(Some("ABC123")).await;
        let token = suspend(&state.orchestrator).await;

        let result = solve_impl(&state.orchestrator, CaptchaSolveParams { token, solution: "ABC123".into() })
            .await
            .unwrap();
        let body = testing::json(&result);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["record"]["case_number"], 1234);
    }

    #[tokio::test]
    async fn test_wrong_answer_issues_new_token() {
        let state = testing::state(Some("ABC123")).await;
        let token = suspend(&state.orchestrator).await;

        let result = solve_impl(&state.orchestrator, CaptchaSolveParams { token: token.clone(), solution: "WRONG".into() })
            .await
            .unwrap();
        let body = testing::json(&result);
        assert_eq!(body["status"], "manual_action_required");
        assert_ne!(body["token"].as_str(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let state = testing::state(Some("ABC123")).await;
        let token = suspend(&state.orchestrator).await;

        let params = CaptchaSolveParams { token, solution: "ABC123".into() };
        solve_impl(&state.orchestrator, params.clone()).await.unwrap();
        let replay = solve_impl(&state.orchestrator, params).await.unwrap();

        assert_eq!(replay.is_error, Some(true));
        assert_eq!(testing::json(&replay)["failure"]["kind"], "session_expired_error");
    }
}
