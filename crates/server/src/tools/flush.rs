//! flush tool implementation.
//!
//! Expires the artifacts of one resource key, or of every key when none is given.

use reducer_core::ResourceKey;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::state::AppState;

/// Parameters for the flush tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FlushParams {
    /// Resource key as 32 hex characters or a dashed uuid. Omit to flush everything.
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushOutput {
    /// The flushed key, or "all".
    pub flushed: String,
    pub remaining_reductions: usize,
}

pub async fn flush_impl(state: &AppState, params: FlushParams) -> Result<CallToolResult, McpError> {
    let key = match params.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(raw) => raw.parse::<ResourceKey>()?,
        None => ResourceKey::NIL,
    };

    state.store.flush(key).await?;

    let flushed = if key.is_nil() { "all".to_string() } else { key.to_hex() };
    tracing::info!(key = %flushed, "flushed via tool");
    json_result(&FlushOutput { flushed, remaining_reductions: state.repository.len() })
}
