//! MCP service exposing `search_docs` and `list_collections` over stdio.
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use docsearch_core::config::SearchSettings;
use docsearch_vector::QueryEngine;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchDocsRequest {
    /// Question or term to look up
    #[schemars(description = "Question or term to search for, in any language")]
    pub query: String,

    /// Collection to restrict results to
    #[schemars(description = "Collection name to filter by (optional). Use list_collections to see what exists")]
    pub collection: Option<String>,

    /// Number of results (default: 5)
    #[schemars(description = "Number of results to return")]
    pub top_k: Option<usize>,
}

#[derive(Clone)]
pub struct DocsService {
    engine: Arc<QueryEngine>,
    default_top_k: usize,
    max_top_k: usize,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl DocsService {
    pub fn new(engine: Arc<QueryEngine>, search: &SearchSettings) -> Self {
        Self {
            engine,
            default_top_k: search.default_top_k,
            max_top_k: search.max_top_k,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Search the product documentation semantically. Use it for questions about features, \
                       settings, error messages and workflows; returns the most relevant passages and screenshot \
                       descriptions."
    )]
    pub async fn search_docs(
        &self,
        Parameters(request): Parameters<SearchDocsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let top_k = request.top_k.unwrap_or(self.default_top_k);
        if top_k == 0 || top_k > self.max_top_k {
            return Err(McpError::invalid_params(
                format!("top_k must be between 1 and {}", self.max_top_k),
                None,
            ));
        }
        info!(query = %request.query, collection = ?request.collection, top_k, "search_docs");
        let text = self.engine.search_docs(&request.query, request.collection.as_deref(), top_k).await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "List the documentation collections in the index with their chunk counts.")]
    pub async fn list_collections(&self) -> Result<CallToolResult, McpError> {
        let text = self.engine.list_collections().await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool_handler]
impl ServerHandler for DocsService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Semantic search over the indexed documentation. Call list_collections to see the \
                 available areas, then search_docs with an optional collection filter."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}
