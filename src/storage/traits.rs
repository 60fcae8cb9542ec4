//! Storage trait definitions (spec §4.4 "GraphStore").

use crate::graph::{Domain, Edge, Node, NodeId, NodeType};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// One hit from [`GraphStore::search_text`].
#[derive(Debug, Clone)]
pub struct TextHit {
    pub id: NodeId,
    pub title: Option<String>,
    pub snippet: String,
    pub bm25_rank: f64,
}

/// One hit from [`GraphStore::find_similar`].
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: NodeId,
    pub score: f32,
}

/// Counts returned by [`GraphStore::get_stats`] (spec.md §4.4, §4.13).
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub nodes: usize,
    pub edges: usize,
    pub vectors: usize,
    pub db_size_bytes: u64,
}

/// Versioned-schema node/edge/FTS/vector store (spec.md §4.4).
///
/// Implementations must be a single logical writer (spec.md §5): no
/// fine-grained internal locking beyond what's needed for `Send + Sync`
/// access from a single pipeline actor is required.
pub trait GraphStore: Send + Sync {
    /// INSERT OR REPLACE semantics keyed on `node.id`.
    fn insert_node(&self, node: &Node) -> StorageResult<()>;

    /// INSERT OR IGNORE semantics keyed on `(source, target, type)`.
    /// Returns `true` if a new row was inserted, `false` if the triple
    /// already existed (invariant I5).
    fn insert_edge(&self, edge: &Edge) -> StorageResult<bool>;

    fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>>;

    fn get_nodes_by_type(&self, node_type: NodeType) -> StorageResult<Vec<Node>>;

    /// Stored hash for a node, or `None` if the node doesn't exist yet
    /// (used by the ingestor's change-detection check).
    fn get_node_hash(&self, id: &NodeId) -> StorageResult<Option<String>>;

    /// All `concept` nodes in the `persona`/`ontology` layer, used to seed
    /// the tokenizer and resolve tag/wikilink targets.
    fn get_lexicon(&self) -> StorageResult<Vec<Node>>;

    /// BM25-ranked full-text search over `(id, title, content, meta)`.
    fn search_text(&self, query: &str, limit: usize) -> StorageResult<Vec<TextHit>>;

    /// Brute-force dot-product scan over stored embeddings, optionally
    /// restricted to one domain, highest score first.
    fn find_similar(
        &self,
        vector: &[f32],
        limit: usize,
        domain: Option<Domain>,
    ) -> StorageResult<Vec<VectorHit>>;

    fn get_edges_from(&self, id: &NodeId) -> StorageResult<Vec<Edge>>;

    fn get_edges_to(&self, id: &NodeId) -> StorageResult<Vec<Edge>>;

    /// All nodes carrying a stored embedding, used by the semantic
    /// orphan-rescue pass.
    fn nodes_with_embedding(&self) -> StorageResult<Vec<Node>>;

    /// Count of edges with `id` as either endpoint (LouvainGate degree check).
    fn edge_degree(&self, id: &NodeId) -> StorageResult<usize>;

    /// `true` if `a` and `b` share a common neighbor (LouvainGate check).
    fn shares_neighbor(&self, a: &NodeId, b: &NodeId) -> StorageResult<bool>;

    fn node_count(&self) -> StorageResult<usize>;

    fn edge_count(&self) -> StorageResult<usize>;

    fn vector_count(&self) -> StorageResult<usize>;

    /// Edges whose source or target id has no corresponding node row.
    fn orphan_edge_count(&self) -> StorageResult<usize>;

    /// Count of nodes in a given domain, used by the validator's
    /// `required_vector_coverage == "experience"` check.
    fn count_nodes_by_domain(&self, domain: Domain) -> StorageResult<usize>;

    fn get_stats(&self) -> StorageResult<StoreStats>;

    /// `PRAGMA data_version` — cheap cross-connection staleness check.
    fn data_version(&self) -> StorageResult<i64>;

    /// WAL checkpoint (truncate mode).
    fn checkpoint(&self) -> StorageResult<()>;
}

/// Extension trait for opening stores from paths or in memory.
pub trait OpenStore: GraphStore + Sized {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    fn open_in_memory() -> StorageResult<Self>;
}
