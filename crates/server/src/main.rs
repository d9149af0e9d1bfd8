//! reducer-mcp server entry point.
//!
//! Boots the reducer (store, repository, reducing queue) from layered
//! configuration and serves the admin tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use reducer_client::{FetchClient, FetchConfig};
use reducer_core::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod state;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(store = ?config.store, content_host = %config.content_host, "Starting reducer on stdio transport");

    let fetcher = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let state = state::AppState::build(config, fetcher).await?;

    let handler = handler::ReducerServer::new(Arc::new(state));
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    Ok(())
}
