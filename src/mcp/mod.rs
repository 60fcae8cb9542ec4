//! MCP server surface (spec.md §6: "optional external boundary") — thin
//! wrappers over [`crate::search::HybridSearch`] and [`GraphStore`]
//! accessors, in the teacher's `#[tool_router]` style.
//!
//! Tools: `search_documents`, `read_node_content`, `explore_links`,
//! `list_directory_structure`, `inject_tags`.

pub mod params;

use std::path::PathBuf;
use std::sync::Arc;

use params::*;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};

use crate::embed::{Embedder, NullEmbedder};
use crate::graph::NodeId;
use crate::search::HybridSearch;
use crate::storage::{GraphStore, OpenStore, SqliteStore};
use crate::weave::{slugify, EdgeWeaver, EdgeWeaverConfig, LouvainGate};

fn ok_text(text: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn err_text(msg: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg)]))
}

#[derive(Clone)]
pub struct LoomgraphMcpServer {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl LoomgraphMcpServer {
    pub fn new(store: Arc<SqliteStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Hybrid (vector + keyword) search over the knowledge graph")]
    async fn search_documents(
        &self,
        Parameters(p): Parameters<SearchDocumentsParams>,
    ) -> Result<CallToolResult, McpError> {
        let search = HybridSearch::new(self.store.as_ref(), self.embedder.as_ref());
        let response = search.search(&p.query, p.limit.unwrap_or(10)).await;
        ok_text(serde_json::to_string_pretty(&response).unwrap_or_default())
    }

    #[tool(description = "Read the full content and metadata of one node by id")]
    fn read_node_content(
        &self,
        Parameters(p): Parameters<NodeIdParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.store.get_node(&NodeId::from_string(p.id.clone())) {
            Ok(Some(node)) => ok_text(serde_json::to_string_pretty(&node).unwrap_or_default()),
            Ok(None) => err_text(format!("node '{}' not found", p.id)),
            Err(e) => err_text(e.to_string()),
        }
    }

    #[tool(description = "List outgoing and incoming edges for a node")]
    fn explore_links(
        &self,
        Parameters(p): Parameters<NodeIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let id = NodeId::from_string(p.id);
        let outgoing = self.store.get_edges_from(&id);
        let incoming = self.store.get_edges_to(&id);
        match (outgoing, incoming) {
            (Ok(out), Ok(inn)) => ok_text(
                serde_json::to_string_pretty(&serde_json::json!({
                    "outgoing": out,
                    "incoming": inn,
                }))
                .unwrap_or_default(),
            ),
            (Err(e), _) | (_, Err(e)) => err_text(e.to_string()),
        }
    }

    #[tool(description = "List configured experience source directories and file counts")]
    fn list_directory_structure(
        &self,
        Parameters(p): Parameters<ListDirectoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let root = PathBuf::from(&p.path);
        if !root.exists() {
            return err_text(format!("path '{}' does not exist", p.path));
        }
        let entries: Vec<String> = walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("md"))
            .map(|e| e.path().display().to_string())
            .collect();
        ok_text(serde_json::to_string_pretty(&entries).unwrap_or_default())
    }

    #[tool(description = "Insert an explicit inline tag into a node's content and re-weave its edges")]
    fn inject_tags(
        &self,
        Parameters(p): Parameters<InjectTagsParams>,
    ) -> Result<CallToolResult, McpError> {
        let id = NodeId::from_string(p.id.clone());
        let node = match self.store.get_node(&id) {
            Ok(Some(node)) => node,
            Ok(None) => return err_text(format!("node '{}' not found", p.id)),
            Err(e) => return err_text(e.to_string()),
        };

        let mut content = node.content.clone().unwrap_or_default();
        for tag in &p.tags {
            content.push_str(&format!("\n\n[Tag: {tag}]"));
        }

        let mut updated = node;
        updated.content = Some(content.clone());
        updated.hash = crate::locus::LocusLedger::hash(&content);
        if let Err(e) = self.store.insert_node(&updated) {
            return err_text(e.to_string());
        }

        let lexicon: std::collections::HashSet<String> = match self.store.get_lexicon() {
            Ok(entries) => entries
                .into_iter()
                .map(|n| n.id.as_str().to_string())
                .collect(),
            Err(e) => return err_text(e.to_string()),
        };
        let weaver = EdgeWeaver::new(lexicon, LouvainGate::default(), EdgeWeaverConfig::default());
        match weaver.weave(self.store.as_ref(), &id, &content) {
            Ok(outcome) => ok_text(format!(
                "inserted {} edge(s), {} rejected by the modularity gate",
                outcome.inserted,
                outcome.rejected.len()
            )),
            Err(e) => err_text(e.to_string()),
        }
    }
}

#[tool_handler]
impl ServerHandler for LoomgraphMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Loomgraph MCP server — hybrid search and structural exploration over a Markdown knowledge graph"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Slugify exposed for MCP consumers building node ids from free text.
pub fn slug(text: &str) -> String {
    slugify(text)
}

/// Best available local embedder with no daemon configured (spec.md §5:
/// the MCP surface is a read-mostly boundary, not the ingestion pipeline,
/// so it doesn't probe for a daemon on every call).
#[cfg(feature = "embeddings")]
fn default_embedder() -> Arc<dyn Embedder> {
    match crate::embed::local::FastEmbedEmbedder::new() {
        Ok(model) => Arc::new(model),
        Err(_) => Arc::new(NullEmbedder),
    }
}

#[cfg(not(feature = "embeddings"))]
fn default_embedder() -> Arc<dyn Embedder> {
    Arc::new(NullEmbedder)
}

pub fn run_mcp_server(db_path: Option<PathBuf>) -> i32 {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {e}");
            return 1;
        }
    };

    rt.block_on(async {
        let path = db_path.unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("loomgraph.db")
        });

        let store = match SqliteStore::open(&path) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                eprintln!("failed to open database at {}: {e}", path.display());
                return 1;
            }
        };

        let embedder = default_embedder();
        let server = LoomgraphMcpServer::new(store, embedder);

        eprintln!("loomgraph mcp server starting on stdio...");

        let service = match server.serve(rmcp::transport::stdio()).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("failed to start MCP server: {e}");
                return 1;
            }
        };

        if let Err(e) = service.waiting().await {
            eprintln!("MCP server error: {e}");
            return 1;
        }

        0
    })
}
