//! queue_status tool implementation.

use reducer_client::{QueueFailure, QueueItem};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use serde::Serialize;

use super::json_result;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatusOutput {
    pub current: Option<QueueItem>,
    pub in_flight: usize,
    /// Keys refused until their failure cooldown passes.
    pub held: usize,
    /// Newest first.
    pub failures: Vec<QueueFailure>,
}

pub async fn queue_status_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let output = QueueStatusOutput {
        current: state.queue.current_item().await,
        in_flight: state.queue.in_flight(),
        held: state.queue.held(),
        failures: state.queue.failures().await,
    };
    json_result(&output)
}
