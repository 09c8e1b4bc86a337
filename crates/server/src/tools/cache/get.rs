//! case_get tool implementation.
//!
//! Reads a cached case record by fingerprint or by query fields.

use courtfetch_client::Orchestrator;
use courtfetch_core::{CacheDb, CachedResult, Error, Fingerprint, Query};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{NumberOrText, json_result};

/// Parameters for the case_get tool.
///
/// Either `fingerprint`, or all three of `case_type`, `case_number` and `filing_year`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Fingerprint of a previous search (64 hex characters).
    pub fingerprint: Option<String>,

    pub case_type: Option<String>,

    pub case_number: Option<NumberOrText>,

    pub filing_year: Option<NumberOrText>,
}

/// Implementation of the case_get tool.
pub async fn get_impl(orchestrator: &Orchestrator, db: &CacheDb, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let (key, cached) = match params {
        CacheGetParams { fingerprint: Some(hex), .. } => {
            let fingerprint = Fingerprint::from_hex(&hex)?;
            (fingerprint.to_string(), db.get_case(&fingerprint).await?)
        }
        CacheGetParams { case_type: Some(case_type), case_number: Some(number), filing_year: Some(year), .. } => {
            let query = Query::parse(&case_type, &number.as_text(), &year.as_text())?;
            (query.to_string(), orchestrator.cached(&query).await?)
        }
        _ => {
            return Err(Error::InvalidInput(
                "Either fingerprint or case_type, case_number and filing_year must be specified".to_string(),
            )
            .into());
        }
    };

    let cached: CachedResult = cached.ok_or(Error::CacheMiss(key))?;
    json_result(&cached)
}
