//! captcha_abandon tool implementation.

use courtfetch_client::Orchestrator;
use courtfetch_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the captcha_abandon tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptchaAbandonParams {
    /// Token of the pending CAPTCHA to give up on.
    pub token: String,
}

/// Output from the captcha_abandon tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptchaAbandonOutput {
    /// False when the token was unknown, already used or expired.
    pub abandoned: bool,
}

/// Implementation of the captcha_abandon tool.
pub async fn abandon_impl(orchestrator: &Orchestrator, params: CaptchaAbandonParams) -> Result<CallToolResult, McpError> {
    if params.token.trim().is_empty() {
        return Err(Error::InvalidInput("token is required".to_string()).into());
    }

    let abandoned = orchestrator.abandon(&params.token).await?;
    json_result(&CaptchaAbandonOutput { abandoned })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::captcha::{CaptchaSolveParams, solve_impl};
    use crate::tools::case_search::{CaseSearchParams, search_impl};
    use crate::tools::{NumberOrText, testing};

    #[tokio::test]
    async fn test_abandon_invalidates_token() {
        let state = testing::state(Some("ABC123")).await;
        let search = CaseSearchParams {
            case_type: "Criminal Appeal".into(),
            case_number: NumberOrText::Number(77),
            filing_year: NumberOrText::Number(2021),
        };
        let suspended = search_impl(&state.orchestrator, search).await.unwrap();
        let token = testing::json(&suspended)["token"].as_str().unwrap().to_string();

        let result = abandon_impl(&state.orchestrator, CaptchaAbandonParams { token: token.clone() })
            .await
            .unwrap();
        assert_eq!(testing::json(&result)["abandoned"], true);

        let again = abandon_impl(&state.orchestrator, CaptchaAbandonParams { token: token.clone() })
            .await
            .unwrap();
        assert_eq!(testing::json(&again)["abandoned"], false);

        let late = solve_impl(&state.orchestrator, CaptchaSolveParams { token, solution: "ABC123".into() })
            .await
            .unwrap();
        assert_eq!(late.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_abandon_requires_token() {
        let state = testing::state(None).await;
        let result = abandon_impl(&state.orchestrator, CaptchaAbandonParams { token: "  ".into() }).await;
        assert!(result.is_err());
    }
}
