//! MCP tool implementations.
//!
//! Each tool is a plain async function over [`AppState`](crate::state::AppState);
//! the handler only routes to them.

pub mod flush;
pub mod get_artifact;
pub mod queue_status;
pub mod rewrite_html;
pub mod saved_urls;

pub use flush::FlushParams;
pub use get_artifact::GetArtifactParams;
pub use rewrite_html::RewriteHtmlParams;

use reducer_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Pretty-printed JSON as the single text content of a successful result.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) fn output<T: serde::de::DeserializeOwned>(result: &CallToolResult) -> T {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    let text = content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
