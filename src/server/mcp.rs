use std::sync::Arc;

use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*, tool,
    tool_handler, tool_router, transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::config::Config;
use crate::error::SearchError;
use crate::filter::SearchFilters;
use crate::search::{PaperSearch, SearchRequest};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchPapersParams {
    #[schemars(description = "Search query string")]
    pub query: String,
    #[schemars(description = "Results requested per source (default 20, capped at 100 per source)")]
    pub max_results: Option<u32>,
    #[schemars(description = "Restrict to these sources: crossref, arxiv, openalex, semantic_scholar")]
    pub sources: Option<Vec<String>>,
    #[schemars(description = "Drop papers published before this year")]
    pub min_year: Option<i32>,
    #[schemars(description = "Drop papers published after this year")]
    pub max_year: Option<i32>,
    #[schemars(description = "Drop papers with fewer citations")]
    pub min_citations: Option<u64>,
    #[schemars(description = "Keep only papers known to be open access")]
    pub open_access_only: Option<bool>,
}

impl From<SearchPapersParams> for SearchRequest {
    fn from(p: SearchPapersParams) -> Self {
        let filters = SearchFilters {
            sources: p.sources,
            min_year: p.min_year,
            max_year: p.max_year,
            min_citations: p.min_citations,
            is_open_access_only: p.open_access_only,
        };
        SearchRequest {
            query: p.query,
            max_results: p.max_results,
            filters: (filters != SearchFilters::default()).then_some(filters),
        }
    }
}

#[derive(Clone)]
pub struct PaperSearchServer {
    tool_router: ToolRouter<Self>,
    config: Arc<Config>,
    engine: Arc<PaperSearch>,
}

#[tool_router]
impl PaperSearchServer {
    pub fn new(config: Arc<Config>, engine: Arc<PaperSearch>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
            engine,
        }
    }

    #[tool(description = "List the bibliographic sources and whether each is enabled")]
    async fn list_sources(&self) -> Result<CallToolResult, McpError> {
        let statuses = self.config.source_status();
        let json = serde_json::to_string_pretty(&statuses)
            .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Search CrossRef, arXiv, OpenAlex and Semantic Scholar at once. \
        Duplicates across sources are merged into one record; results are ranked by citation count.")]
    async fn search_papers(
        &self,
        Parameters(params): Parameters<SearchPapersParams>,
    ) -> Result<CallToolResult, McpError> {
        let request = SearchRequest::from(params);
        let response = self.engine.search(&request).await.map_err(|e| match e {
            SearchError::EmptyQuery => McpError::invalid_params(e.to_string(), None),
            SearchError::AllSourcesFailed { .. } => {
                McpError::internal_error(format!("Search failed: {}", e), None)
            }
        })?;

        let json = serde_json::to_string_pretty(&response)
            .map_err(|e| McpError::internal_error(format!("{}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_handler]
impl ServerHandler for PaperSearchServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Federated academic paper search. One query fans out to CrossRef, arXiv, \
                 OpenAlex and Semantic Scholar; records describing the same work are merged \
                 by shared identifiers and ranked by citation count."
                    .into(),
            ),
        }
    }
}

/// Serve MCP over stdin/stdout until the client disconnects.
pub async fn run_stdio(server: PaperSearchServer) -> anyhow::Result<()> {
    tracing::info!("Serving MCP over stdio");
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
