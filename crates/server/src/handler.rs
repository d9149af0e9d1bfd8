//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::state::AppState;
use crate::tools::{
    FlushParams, GetArtifactParams, RewriteHtmlParams, flush::flush_impl, get_artifact::get_impl,
    queue_status::queue_status_impl, rewrite_html::rewrite_impl, saved_urls::saved_urls_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for the reducer.
#[derive(Clone)]
pub struct ReducerServer {
    state: Arc<AppState>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ReducerServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Rewrite the <head> of an HTML document, replacing stylesheet links and scripts with reduced bundles. Bundles not reduced yet are queued and left unchanged."
    )]
    async fn rewrite_html(&self, params: Parameters<RewriteHtmlParams>) -> Result<CallToolResult, McpError> {
        rewrite_impl(&self.state, params.0).await
    }

    #[tool(description = "Expire the reduced artifacts of one resource key, or of every key when no key is given.")]
    async fn flush(&self, params: Parameters<FlushParams>) -> Result<CallToolResult, McpError> {
        flush_impl(&self.state, params.0).await
    }

    #[tool(description = "List the latest live reduced url for each resource key.")]
    async fn saved_urls(&self) -> Result<CallToolResult, McpError> {
        saved_urls_impl(&self.state).await
    }

    #[tool(
        description = "Fetch a reduced artifact by url with its content type and ETag. Honors If-None-Match with a 304 status."
    )]
    async fn get_artifact(&self, params: Parameters<GetArtifactParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.state, params.0).await
    }

    #[tool(description = "Show the bundle being reduced, the number queued, and recent reduction failures.")]
    async fn queue_status(&self) -> Result<CallToolResult, McpError> {
        queue_status_impl(&self.state).await
    }
}

impl ServerHandler for ReducerServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "reducer".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
