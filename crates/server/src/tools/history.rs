//! search_history tool implementation.
//!
//! Returns the newest query log rows alongside aggregate statistics.

use courtfetch_core::{CacheDb, QueryLogEntry, QueryStats};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Upper bound on rows returned in one call.
const MAX_LIMIT: usize = 500;

/// Parameters for the search_history tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchHistoryParams {
    /// Number of rows to return (default from configuration, at most 500).
    pub limit: Option<usize>,
}

/// Output from the search_history tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHistoryOutput {
    pub stats: QueryStats,
    pub queries: Vec<QueryLogEntry>,
}

/// Implementation of the search_history tool.
pub async fn history_impl(
    db: &CacheDb, default_limit: usize, params: SearchHistoryParams,
) -> Result<CallToolResult, McpError> {
    let limit = params.limit.unwrap_or(default_limit).clamp(1, MAX_LIMIT);

    let output = SearchHistoryOutput { stats: db.query_stats().await?, queries: db.recent_queries(limit).await? };
    json_result(&output)
}
