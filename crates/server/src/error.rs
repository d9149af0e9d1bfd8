//! Structured errors raised by the tool layer itself.
//!
//! Storage and fetch failures arrive as [`reducer_core::Error`], which already
//! converts to an MCP error; this enum covers what only the tools produce.

use reducer_client::RewriteError;
use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid input parameters (e.g., empty HTML).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The streaming rewriter gave up on the document.
    #[error("REWRITE_FAILED: {0}")]
    Rewrite(#[from] RewriteError),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::Rewrite(e) => (-32005, e.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
