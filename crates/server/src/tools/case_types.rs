//! case_types tool implementation.
//!
//! Reads the live dropdown off the portal's search form and falls back to
//! the built-in list when the portal cannot be read.

use courtfetch_client::Orchestrator;
use courtfetch_core::case_types::{KNOWN_CASE_TYPES, display_label};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaseTypeEntry {
    /// Text of the portal dropdown option.
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abbreviation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CaseTypeEntry {
    fn known(abbreviation: &str, description: &str) -> Self {
        Self {
            label: display_label(abbreviation, description),
            abbreviation: Some(abbreviation.to_string()),
            description: Some(description.to_string()),
        }
    }

    /// A portal label, annotated when it matches a known type.
    fn from_label(label: String) -> Self {
        match KNOWN_CASE_TYPES.iter().find(|(a, d)| display_label(a, d) == label) {
            Some((abbreviation, description)) => Self::known(abbreviation, description),
            None => Self { label, abbreviation: None, description: None },
        }
    }
}

/// Where the list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CaseTypeSource {
    Portal,
    Builtin,
}

/// Output from the case_types tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaseTypesOutput {
    pub case_types: Vec<CaseTypeEntry>,
    pub source: CaseTypeSource,
    pub note: String,
}

fn builtin(note: String) -> CaseTypesOutput {
    CaseTypesOutput {
        case_types: KNOWN_CASE_TYPES.iter().map(|(a, d)| CaseTypeEntry::known(a, d)).collect(),
        source: CaseTypeSource::Builtin,
        note,
    }
}

/// Implementation of the case_types tool.
pub async fn case_types_impl(orchestrator: &Orchestrator) -> Result<CallToolResult, McpError> {
    let output = match orchestrator.live_case_types().await {
        Ok(labels) if !labels.is_empty() => CaseTypesOutput {
            case_types: labels.into_iter().map(CaseTypeEntry::from_label).collect(),
            source: CaseTypeSource::Portal,
            note: "Read from the portal's search form.".to_string(),
        },
        Ok(_) => builtin("The portal takes the case type as free text; these are the known types.".to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "case type dropdown unavailable, using built-in list");
            builtin(format!("Portal unavailable ({e}); the portal's own dropdown is authoritative."))
        }
    };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tools::testing;
    use courtfetch_client::{FixtureOptions, FixturePortal};
    use courtfetch_core::CacheDb;

    fn output(result: &CallToolResult) -> CaseTypesOutput {
        serde_json::from_value(testing::json(result)).unwrap()
    }

    #[tokio::test]
    async fn test_reads_portal_dropdown() {
        let state = testing::state(None).await;
        let out = output(&case_types_impl(&state.orchestrator).await.unwrap());
        assert_eq!(out.source, CaseTypeSource::Portal);

        let civil = out.case_types.iter().find(|t| t.label == "Civil Appeal").unwrap();
        assert_eq!(civil.abbreviation, None);

        let lpa = out.case_types.iter().find(|t| t.label == "LPA (Letters Patent Appeal)").unwrap();
        assert_eq!(lpa.abbreviation.as_deref(), Some("LPA"));
        assert_eq!(lpa.description.as_deref(), Some("Letters Patent Appeal"));
    }

    #[tokio::test]
    async fn test_falls_back_to_builtin_list() {
        let config = testing::config();
        let db = CacheDb::open_in_memory().await.unwrap();
        let portal = FixturePortal::new(FixtureOptions { fail_navigations: 100, ..Default::default() });
        let orchestrator = Orchestrator::new(&config, Arc::new(portal), db).unwrap();

        let out = output(&case_types_impl(&orchestrator).await.unwrap());
        assert_eq!(out.source, CaseTypeSource::Builtin);
        assert_eq!(out.case_types.len(), KNOWN_CASE_TYPES.len());
        assert!(out.note.starts_with("Portal unavailable"));
    }
}
