//! rewrite_html tool implementation.
//!
//! Runs a document through the same streaming filter a response body would
//! pass through. Bundles without a reduction are handed to the queue and the
//! markup is left as is for this call.

use std::sync::Arc;

use reducer_client::{ReductionRequester, ResponseFilter, ResponseTransformer};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use super::json_result;
use crate::error::ToolError;
use crate::state::AppState;

/// Input parameters for the rewrite_html tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RewriteHtmlParams {
    /// The raw HTML document.
    pub html: String,

    /// Absolute page url; relative hrefs and srcs are resolved against it.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bytes per write into the rewriter. Small values exercise boundary handling.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    4096
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteHtmlOutput {
    pub html: String,
    /// Whether any tag in the head was replaced.
    pub rewritten: bool,
    /// Bundles queued or being reduced after this call.
    pub in_flight: usize,
}

pub async fn rewrite_impl(state: &AppState, params: RewriteHtmlParams) -> Result<CallToolResult, McpError> {
    if params.html.is_empty() {
        return Err(ToolError::InvalidInput("html cannot be empty".into()).into());
    }
    if params.chunk_size == 0 {
        return Err(ToolError::InvalidInput("chunk_size must be positive".into()).into());
    }

    let mut transformer = ResponseTransformer::new(Arc::clone(&state.repository), &state.config.enabled_kinds())
        .with_requester(Arc::clone(&state.queue) as Arc<dyn ReductionRequester>);
    if let Some(base) = params.base_url.as_deref() {
        let base = Url::parse(base).map_err(|e| ToolError::InvalidInput(format!("invalid base_url {base:?}: {e}")))?;
        transformer = transformer.with_base_url(base);
    }

    let filter = ResponseFilter::new(Arc::new(transformer)).map_err(ToolError::from)?;
    let bytes = filter
        .rewrite_document(params.html.as_bytes(), params.chunk_size)
        .map_err(ToolError::from)?;
    let html = String::from_utf8_lossy(&bytes).into_owned();

    let output = RewriteHtmlOutput { rewritten: html != params.html, html, in_flight: state.queue.in_flight() };
    tracing::debug!(rewritten = output.rewritten, in_flight = output.in_flight, "rewrote document");
    json_result(&output)
}
