//! loomgraph: knowledge graph ingestion and hybrid retrieval engine for
//! Markdown corpora.
//!
//! # Core concepts
//!
//! - **Nodes/Edges**: a typed, domain-scoped graph persisted in SQLite,
//!   with full-text and vector search over the same rows.
//! - **Locus**: content-addressed segmentation of Markdown into stable,
//!   size-bounded boxes, idempotently keyed by content hash.
//! - **Weaving**: turning explicit signals in content (tags, wikilinks),
//!   chronology, and embedding similarity into graph edges.
//!
//! # Example
//!
//! ```
//! use loomgraph::storage::{OpenStore, SqliteStore};
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! // Store is ready for ingestion.
//! ```

pub mod bento;
pub mod config;
pub mod embed;
pub mod graph;
pub mod ingest;
pub mod locus;
pub mod mcp;
pub mod normalize;
pub mod search;
pub mod storage;
pub mod tokenizer;
pub mod validate;
pub mod vector;
pub mod weave;

pub use bento::{BentoBox, BentoBoxer, BoxKind};
pub use config::{ConfigError, Settings};
pub use embed::{DaemonEmbedder, EmbedError, Embedder, FallbackEmbedder, NullEmbedder};
pub use graph::{Domain, Edge, Layer, Node, NodeId, NodeType};
pub use ingest::{IngestError, IngestReport, IngestStats, Ingestor};
pub use locus::{LocusError, LocusLedger};
pub use normalize::Normalizer;
pub use search::{HybridSearch, RankedHit, SearchResponse};
pub use storage::{GraphStore, OpenStore, SqliteStore, StorageError, StorageResult};
pub use tokenizer::{ExtractedEntities, LexiconEntry, Tokenizer};
pub use validate::{IngestionStats, Validator};
pub use weave::{EdgeWeaver, LouvainGate, SemanticWeaver, TimelineWeaver};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
