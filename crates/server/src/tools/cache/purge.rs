//! cache_purge tool implementation.
//!
//! Purges one cached result by fingerprint, cached results by expiry, age or
//! count, expired CAPTCHA sessions, and old query log rows.

use courtfetch_client::Orchestrator;
use courtfetch_core::{CacheDb, Error, Fingerprint};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Drop the single cached result with this fingerprint so the next
    /// search refetches it.
    pub fingerprint: Option<String>,

    /// Purge results whose freshness window has passed.
    #[serde(default)]
    pub expired: bool,

    /// Purge results fetched more than this many days ago.
    pub older_than_days: Option<u32>,

    /// Keep only the newest N results (LRU purge).
    pub max_entries: Option<usize>,

    /// Reclaim expired CAPTCHA sessions and close their browsers.
    #[serde(default)]
    pub sessions: bool,

    /// Purge query log rows older than this many days.
    pub query_log_older_than_days: Option<u32>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of cached results deleted.
    pub deleted: u64,

    /// Number of expired CAPTCHA sessions reclaimed.
    pub sessions_reclaimed: usize,

    /// Number of query log rows deleted.
    pub log_rows_deleted: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(
    orchestrator: &Orchestrator, cache: &CacheDb, params: CachePurgeParams,
) -> Result<CallToolResult, McpError> {
    if params.fingerprint.is_none()
        && !params.expired
        && params.older_than_days.is_none()
        && params.max_entries.is_none()
        && !params.sessions
        && params.query_log_older_than_days.is_none()
    {
        return Err(Error::InvalidInput(
            "At least one of fingerprint, expired, older_than_days, max_entries, sessions or query_log_older_than_days must be specified"
                .to_string(),
        )
        .into());
    }

    let mut output = CachePurgeOutput::default();

    if let Some(hex) = &params.fingerprint {
        let fingerprint = Fingerprint::from_hex(hex)?;
        if cache.delete_case(&fingerprint).await? {
            output.deleted += 1;
        }
    }

    if params.expired {
        output.deleted += cache.purge_expired_results().await?;
    }

    if let Some(days) = params.older_than_days {
        output.deleted += cache.purge_results_older_than(days).await?;
    }

    if let Some(max_entries) = params.max_entries {
        output.deleted += cache.purge_results_lru(max_entries).await?;
    }

    if params.sessions {
        output.sessions_reclaimed = orchestrator.sweep().await?;
    }

    if let Some(days) = params.query_log_older_than_days {
        output.log_rows_deleted = cache.purge_query_log_older_than(days).await?;
    }

    tracing::info!(
        deleted = output.deleted,
        sessions = output.sessions_reclaimed,
        log_rows = output.log_rows_deleted,
        "cache purged"
    );
    json_result(&output)
}
