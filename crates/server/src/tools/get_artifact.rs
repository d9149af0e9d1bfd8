//! get_artifact tool implementation.
//!
//! Serves a produced url the way the content endpoint would: mime type from
//! the file name, a strong ETag equal to the signature, and 304 when the
//! caller's validator matches. The durable backend adds the stored history,
//! so expired artifacts are still described (status 404, no content).
//! Only text bundles carry their body; sprites report length alone.

use reducer_core::url::parse_file_name;
use reducer_core::{Error, ResourceKind};
use reducer_core::http::{content_type_for_url, etag_for, is_not_modified};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::state::AppState;

/// Parameters for the get_artifact tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetArtifactParams {
    /// A url produced by the reducer.
    pub url: String,

    /// Value of an `If-None-Match` request header.
    #[serde(default)]
    pub if_none_match: Option<String>,

    /// Include the body in the response. Ignored for sprites.
    #[serde(default = "default_true")]
    pub include_content: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetArtifactOutput {
    pub url: String,
    /// 200, 304 when the validator matched, 404 when only an expired row remains.
    pub status: u16,
    pub content_type: Option<String>,
    pub etag: String,
    pub length: usize,
    /// Body of a css or javascript bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_urls: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expired: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

pub async fn get_impl(state: &AppState, params: GetArtifactParams) -> Result<CallToolResult, McpError> {
    let url = params.url.trim();
    if url.is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let mut body = Vec::new();
    let live = state.store.send_content(url, &mut body).await?;
    let history = match &state.durable {
        Some(durable) => durable.artifact(url).await?,
        None => None,
    };

    if !live && history.is_none() {
        return Err(Error::NotFound(url.to_string()).into());
    }

    let status = match (live, is_not_modified(params.if_none_match.as_deref(), url)) {
        (false, _) => 404,
        (true, true) => 304,
        (true, false) => 200,
    };
    let content = (status == 200 && params.include_content && is_text(url))
        .then(|| String::from_utf8_lossy(&body).into_owned());

    let output = GetArtifactOutput {
        url: url.to_string(),
        status,
        content_type: content_type_for_url(url).map(str::to_string),
        etag: etag_for(url),
        length: body.len(),
        content,
        original_urls: history.as_ref().map(|a| a.original_urls.clone()),
        is_expired: history.as_ref().map(|a| a.is_expired),
        last_updated: history.map(|a| a.last_updated),
    };
    tracing::debug!(url, status, "served artifact");
    json_result(&output)
}

fn is_text(url: &str) -> bool {
    matches!(
        parse_file_name(url).and_then(ResourceKind::from_file_name),
        Some(ResourceKind::Css | ResourceKind::JavaScript)
    )
}
