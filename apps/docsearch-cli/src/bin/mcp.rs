//! docsearch MCP server (stdio transport).
//!
//! Add to an MCP client configuration:
//! ```json
//! { "mcpServers": { "docsearch": { "command": "docsearch-mcp" } } }
//! ```
use anyhow::Result;
use rmcp::{transport::stdio, ServiceExt};
use std::sync::Arc;
use tracing::info;

use docsearch_cli::{init_tracing, server::DocsService};
use docsearch_core::config::Config;
use docsearch_embed::get_default_embedder;
use docsearch_vector::QueryEngine;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let settings = Config::load()?.settings()?;
    let index_dir = settings.index_dir();

    let embedder = get_default_embedder(&settings)?;
    let engine = QueryEngine::new(&index_dir, embedder).with_overfetch_factor(settings.search.overfetch_factor);
    let service = DocsService::new(Arc::new(engine), &settings.search);

    info!(index_dir = %index_dir.display(), "starting docsearch MCP server");
    let server = service.serve(stdio()).await?;
    server.waiting().await?;
    info!("docsearch MCP server stopped");
    Ok(())
}
