//! saved_urls tool implementation.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedUrlsOutput {
    pub count: usize,
    /// Latest live url per resource key, ordered by key.
    pub urls: BTreeMap<String, String>,
}

pub async fn saved_urls_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let urls: BTreeMap<String, String> =
        state.store.saved_urls().await?.into_iter().map(|(key, url)| (key.to_hex(), url)).collect();

    json_result(&SavedUrlsOutput { count: urls.len(), urls })
}
