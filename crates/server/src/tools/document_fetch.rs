//! document_fetch tool implementation.
//!
//! Downloads an order or judgment a case record links to and returns it as
//! an embedded base64 resource.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use courtfetch_client::PortalProbe;
use courtfetch_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content, ResourceContents},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the document_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentFetchParams {
    /// Document link from a case record, absolute or relative to the portal.
    pub url: String,
}

/// Implementation of the document_fetch tool.
pub async fn fetch_impl(probe: &PortalProbe, params: DocumentFetchParams) -> Result<CallToolResult, McpError> {
    let document = probe.fetch_document(&params.url).await?;

    let summary = serde_json::json!({
        "url": document.url,
        "content_type": document.content_type,
        "bytes": document.data.len(),
    });
    let json = serde_json::to_string_pretty(&summary).map_err(Error::from)?;

    Ok(CallToolResult::success(vec![
        Content::text(json),
        Content::resource(ResourceContents::BlobResourceContents {
            uri: document.url,
            mime_type: Some(document.content_type),
            blob: STANDARD.encode(&document.data),
            meta: None,
        }),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing;
    use base64::Engine as _;

    #[tokio::test]
    async fn test_demo_document_as_resource() {
        let state = testing::state(None).await;
        let params = DocumentFetchParams { url: "/orders/2022/1234.pdf".into() };

        let result = fetch_impl(&state.probe, params).await.unwrap();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.content.len(), 2);

        let summary = testing::json(&result);
        assert_eq!(summary["content_type"], "application/pdf");
        assert!(summary["url"].as_str().unwrap().ends_with("/orders/2022/1234.pdf"));

        let resource = serde_json::to_value(&result.content[1]).unwrap();
        assert_eq!(resource["resource"]["mimeType"], "application/pdf");
        let pdf = STANDARD.decode(resource["resource"]["blob"].as_str().unwrap()).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert_eq!(summary["bytes"], pdf.len());
    }

    #[tokio::test]
    async fn test_refuses_foreign_host() {
        let state = testing::state(None).await;
        let params = DocumentFetchParams { url: "https://elsewhere.example/order.pdf".into() };

        let err = fetch_impl(&state.probe, params).await.unwrap_err();
        assert!(err.message.contains("not on the portal host"));
    }
}
