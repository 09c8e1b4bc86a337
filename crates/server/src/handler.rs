//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::cache::{CacheGetParams, CachePurgeParams, get_impl, purge_impl};
use crate::tools::captcha::{CaptchaAbandonParams, CaptchaSolveParams, abandon_impl, solve_impl};
use crate::tools::case_search::{CaseSearchParams, search_impl};
use crate::tools::case_types::case_types_impl;
use crate::tools::document_fetch::{DocumentFetchParams, fetch_impl};
use crate::tools::history::{SearchHistoryParams, history_impl};
use crate::tools::portal_status::status_impl;

use courtfetch_client::{Orchestrator, PortalProbe};
use courtfetch_core::{AppConfig, CacheDb};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// Everything the tools share: one engine, one database.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub db: CacheDb,
    pub probe: PortalProbe,
    pub config: AppConfig,
}

/// The main MCP server handler for courtfetch.
#[derive(Clone)]
pub struct CourtServer {
    tool_router: ToolRouter<Self>,
    state: Arc<AppState>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl CourtServer {
    /// Create a new server handler.
    pub fn new(state: AppState) -> Self {
        Self { tool_router: Self::tool_router(), state: Arc::new(state) }
    }

    /// Look up a case on the court portal.
    ///
    /// Answers from the cache when a fresh result exists. When the portal shows
    /// a CAPTCHA the result carries the image and a token for `captcha_solve`.
    #[tool(
        description = "Search the court portal for a case by case type, case number and filing year. Returns the parsed case record, or a CAPTCHA image plus a resume token when a person must solve a CAPTCHA."
    )]
    async fn case_search(&self, params: Parameters<CaseSearchParams>) -> Result<CallToolResult, McpError> {
        search_impl(&self.state.orchestrator, params.0).await
    }

    #[tool(
        description = "Submit a person's answer to a pending CAPTCHA. Tokens are single-use: a wrong answer returns a new CAPTCHA with a new token."
    )]
    async fn captcha_solve(&self, params: Parameters<CaptchaSolveParams>) -> Result<CallToolResult, McpError> {
        solve_impl(&self.state.orchestrator, params.0).await
    }

    #[tool(description = "Abandon a pending CAPTCHA and close its browser session.")]
    async fn captcha_abandon(&self, params: Parameters<CaptchaAbandonParams>) -> Result<CallToolResult, McpError> {
        abandon_impl(&self.state.orchestrator, params.0).await
    }

    /// Read a cached case without contacting the portal.
    #[tool(
        description = "Get a cached case record by fingerprint or by case type, number and year. Never contacts the portal."
    )]
    async fn case_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.state.orchestrator, &self.state.db, params.0).await
    }

    #[tool(
        description = "Purge one cached case by fingerprint, cached case results by expiry, age or count, expired CAPTCHA sessions or old query log rows. At least one option is required."
    )]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.state.orchestrator, &self.state.db, params.0).await
    }

    #[tool(description = "Recent case searches, newest first, with aggregate statistics.")]
    async fn search_history(&self, params: Parameters<SearchHistoryParams>) -> Result<CallToolResult, McpError> {
        history_impl(&self.state.db, self.state.config.history_limit, params.0).await
    }

    #[tool(
        description = "List the case types the portal's search form offers, read live from its dropdown. Falls back to the built-in list when the portal cannot be read."
    )]
    async fn case_types(&self) -> Result<CallToolResult, McpError> {
        case_types_impl(&self.state.orchestrator).await
    }

    #[tool(
        description = "Download an order, judgment or other document linked from a case record. Only links on the portal's own host are fetched; the file comes back as a base64 embedded resource."
    )]
    async fn document_fetch(&self, params: Parameters<DocumentFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.state.probe, params.0).await
    }

    /// Connectivity and engine health.
    #[tool(description = "Check whether the court portal is reachable and report engine status.")]
    async fn portal_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.state).await
    }
}

impl ServerHandler for CourtServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "courtfetch".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Call case_search first. If it returns a CAPTCHA, show the image to a person and pass their answer \
                 to captcha_solve with the token. Use document_fetch for document links in a case record."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
