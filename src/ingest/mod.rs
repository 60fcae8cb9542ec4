//! Ingestor (C11): two-phase orchestration (persona -> experience), change
//! detection, and finalization (spec.md §4.11).
//!
//! Grounded in the teacher's `adapter::engine_sink::IngestPipeline` as the
//! top-level orchestrator shape (a struct holding the store/collaborators,
//! with an `ingest` entry point that the CLI and MCP surface both call
//! through), generalized from Plexus's single-adapter dispatch to the
//! fixed two-phase pipeline spec.md §2/§4.11 describes.

mod frontmatter;
mod lexicon_json;

pub use frontmatter::parse_frontmatter;
pub use lexicon_json::{DirectiveEntryJson, DirectiveRelationshipJson, LexiconEntryJson};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::bento::BentoBoxer;
use crate::config::Settings;
use crate::embed::{EmbedError, Embedder};
use crate::graph::{Domain, Edge, Layer, Node, NodeId, NodeType};
use crate::locus::LocusLedger;
use crate::normalize::Normalizer;
use crate::storage::{GraphStore, StorageError};
use crate::tokenizer::{LexiconEntry, Tokenizer};
use crate::validate::{ValidationReport, Validator};
use crate::weave::{EdgeWeaver, EdgeWeaverConfig, LouvainGate, SemanticWeaver, TimelineWeaver};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON artifact {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Per-run delta counters (spec.md §8 scenarios report these as `stats`).
#[derive(Debug, Clone, Default)]
pub struct IngestStats {
    pub nodes_added: usize,
    pub edges_added: usize,
    pub vectors_added: usize,
    pub nodes_skipped: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub edges_rejected: usize,
}

impl std::ops::AddAssign for IngestStats {
    fn add_assign(&mut self, rhs: Self) {
        self.nodes_added += rhs.nodes_added;
        self.edges_added += rhs.edges_added;
        self.vectors_added += rhs.vectors_added;
        self.nodes_skipped += rhs.nodes_skipped;
        self.files_processed += rhs.files_processed;
        self.files_failed += rhs.files_failed;
        self.edges_rejected += rhs.edges_rejected;
    }
}

/// Outcome of a full `Ingestor::run` call: delta counters from both
/// phases plus the finalization pass counts and the validation report
/// (spec.md §4.11 "Finalization: run TimelineWeaver, then SemanticWeaver,
/// then Validator").
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub stats: IngestStats,
    pub timeline_edges: usize,
    pub semantic_edges: usize,
    pub validation: ValidationReport,
}

static LOCUS_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^<!--\s*locus:([a-zA-Z0-9-]+)\s*-->[ \t]*\n?").unwrap());

/// Orchestrates Phase 1 (persona) then Phase 2 (experience) over one
/// [`GraphStore`], using one [`Embedder`] and [`LouvainGate`] threshold
/// for the whole run (spec.md §5: singletons constructed once, passed by
/// reference to pipeline stages).
pub struct Ingestor<'a> {
    store: &'a dyn GraphStore,
    ledger: &'a LocusLedger,
    embedder: &'a dyn Embedder,
    gate_threshold: usize,
    semantic_threshold: f32,
    edge_weaver_config: EdgeWeaverConfig,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a dyn GraphStore, ledger: &'a LocusLedger, embedder: &'a dyn Embedder) -> Self {
        Self {
            store,
            ledger,
            embedder,
            gate_threshold: 50,
            semantic_threshold: 0.85,
            edge_weaver_config: EdgeWeaverConfig::default(),
        }
    }

    pub fn with_gate_threshold(mut self, threshold: usize) -> Self {
        self.gate_threshold = threshold;
        self
    }

    pub fn with_semantic_threshold(mut self, threshold: f32) -> Self {
        self.semantic_threshold = threshold;
        self
    }

    pub fn with_edge_weaver_config(mut self, config: EdgeWeaverConfig) -> Self {
        self.edge_weaver_config = config;
        self
    }

    /// Run both phases plus finalization, honoring `settings.paths`.
    pub async fn run(&self, settings: &Settings) -> IngestResult<IngestReport> {
        let baseline = Validator::capture_baseline(self.store)?;

        let tokenizer = self.phase1(
            &settings.paths.sources.persona.lexicon,
            &settings.paths.sources.persona.cda,
        )?;

        let dirs: Vec<PathBuf> = settings
            .paths
            .sources
            .experience
            .iter()
            .map(|s| s.path.clone())
            .collect();
        let stats = self.phase2(&dirs, &tokenizer).await?;

        let timeline_edges = TimelineWeaver.run(self.store)?;
        let semantic_edges = SemanticWeaver::new(self.semantic_threshold)
            .with_gate(LouvainGate::new(self.gate_threshold))
            .run(self.store)?;

        let validation = Validator::validate(self.store, &baseline, 0, "none")?;

        Ok(IngestReport {
            stats,
            timeline_edges,
            semantic_edges,
            validation,
        })
    }

    /// Phase 1 (spec.md §4.11): load lexicon and enriched-directive JSON
    /// into the store, seeding the tokenizer. Returns the tokenizer so
    /// Phase 2 can reuse the same lexicon snapshot (spec.md §5: "the
    /// lexicon (immutable after Phase 1 seeding)").
    pub fn phase1(&self, lexicon_path: &Path, cda_path: &Path) -> IngestResult<Tokenizer> {
        let lexicon_entries = self.load_lexicon(lexicon_path)?;

        for entry in &lexicon_entries {
            let mut node = Node::new(
                NodeId::from_string(entry.id.clone()),
                NodeType::Concept,
                Domain::Persona,
                Layer::Ontology,
            );
            if let Some(title) = &entry.title {
                node = node.with_title(title.clone());
            }
            node = node
                .with_meta("category", json!(entry.category))
                .with_meta("aliases", json!(entry.aliases))
                .with_meta("type", json!(entry.entry_type));
            self.store.insert_node(&node)?;
        }
        info!(count = lexicon_entries.len(), "seeded lexicon concepts");

        let tokenizer_entries: Vec<LexiconEntry> = lexicon_entries
            .iter()
            .map(|e| LexiconEntry {
                id: e.id.clone(),
                title: e.title.clone(),
                aliases: e.aliases.clone().unwrap_or_default(),
                category: e.category.clone(),
                entry_type: e.entry_type.clone(),
            })
            .collect();
        let tokenizer = Tokenizer::from_lexicon(&tokenizer_entries);

        let lexicon_ids: HashSet<String> = lexicon_entries.iter().map(|e| e.id.clone()).collect();
        let directives = self.load_directives(cda_path)?;
        let gate = LouvainGate::new(self.gate_threshold);

        for entry in &directives {
            let mut node = Node::new(
                NodeId::from_string(entry.id.clone()),
                NodeType::Directive,
                Domain::Persona,
                Layer::Directive,
            );
            if let Some(title) = &entry.title {
                node = node.with_title(title.clone());
            }
            if let Some(content) = &entry.content {
                node = node
                    .with_content(content.clone())
                    .with_hash(LocusLedger::hash(content));
            }
            self.store.insert_node(&node)?;

            for rel in &entry.relationships {
                let target_known = lexicon_ids.contains(&rel.target)
                    || directives.iter().any(|d| d.id == rel.target);
                if !target_known {
                    debug!(target = %rel.target, "directive relationship target unresolved, inserting dangling edge");
                }
                let decision = gate.check(self.store, &node.id, &NodeId::from_string(rel.target.clone()))?;
                if decision.allowed {
                    let edge = Edge::new(
                        node.id.clone(),
                        NodeId::from_string(rel.target.clone()),
                        rel.rel_type.to_uppercase(),
                    );
                    self.store.insert_edge(&edge)?;
                } else if let Some(reason) = decision.reason {
                    info!(reason, "LouvainGate rejected directive relationship");
                }
            }
        }
        info!(count = directives.len(), "seeded directives");

        Ok(tokenizer)
    }

    fn load_lexicon(&self, path: &Path) -> IngestResult<Vec<LexiconEntryJson>> {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed lexicon JSON, continuing with empty lexicon");
                    Ok(Vec::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "lexicon file not found, continuing with empty lexicon");
                Ok(Vec::new())
            }
            Err(source) => Err(IngestError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn load_directives(&self, path: &Path) -> IngestResult<Vec<DirectiveEntryJson>> {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed directive JSON, continuing with empty directive set");
                    Ok(Vec::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "directive file not found, continuing with empty directive set");
                Ok(Vec::new())
            }
            Err(source) => Err(IngestError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Phase 2 (spec.md §4.11): scan each configured source directory for
    /// `.md` files, upserting a node per locus box with change detection.
    pub async fn phase2(&self, dirs: &[PathBuf], tokenizer: &Tokenizer) -> IngestResult<IngestStats> {
        let edge_weaver = self.build_edge_weaver()?;
        let mut stats = IngestStats::default();

        for dir in dirs {
            if !dir.exists() {
                warn!(dir = %dir.display(), "experience source directory does not exist, skipping");
                continue;
            }
            for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                match self.ingest_file(path, tokenizer, &edge_weaver).await {
                    Ok(file_stats) => {
                        stats += file_stats;
                        stats.files_processed += 1;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to ingest file, continuing with next file");
                        stats.files_failed += 1;
                    }
                }
            }
        }

        Ok(stats)
    }

    fn build_edge_weaver(&self) -> IngestResult<EdgeWeaver> {
        let lexicon = self.store.get_lexicon()?;
        let ids: HashSet<String> = lexicon.into_iter().map(|n| n.id.as_str().to_string()).collect();
        Ok(EdgeWeaver::new(
            ids,
            LouvainGate::new(self.gate_threshold),
            self.edge_weaver_config.clone(),
        ))
    }

    async fn ingest_file(
        &self,
        path: &Path,
        tokenizer: &Tokenizer,
        edge_weaver: &EdgeWeaver,
    ) -> IngestResult<IngestStats> {
        let raw = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("untitled.md");
        let (frontmatter, body) = parse_frontmatter(&raw);
        let body = Normalizer::normalize(&body, filename);

        let file_type = infer_node_type(&frontmatter, path);
        let boxes = self.locate_boxes(&body, filename);

        let mut stats = IngestStats::default();

        for (box_id, content) in boxes {
            let node_id = NodeId::from_string(box_id);
            let current_hash = LocusLedger::hash(&content);

            if self.store.get_node_hash(&node_id)? == Some(current_hash.clone()) {
                stats.nodes_skipped += 1;
                continue;
            }

            let mut node = Node::new(node_id.clone(), file_type, Domain::Experience, Layer::Note)
                .with_content(content.clone())
                .with_hash(current_hash);

            if content.trim().len() > 50 {
                match self.embedder.embed(&content).await {
                    Ok(vector) => {
                        node = node.with_embedding(vector);
                        stats.vectors_added += 1;
                    }
                    Err(EmbedError::Unavailable) => {
                        debug!(path = %path.display(), "no embedder available, upserting without a vector");
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "embedding failed, upserting without a vector");
                    }
                }
            }

            let entities = tokenizer.extract(&content);
            node = node
                .with_meta("source", json!(path.display().to_string()))
                .with_meta("semantic_tokens", serde_json::to_value(&entities).unwrap_or(json!({})));
            for (key, value) in &frontmatter {
                node = node.with_meta(key.clone(), value.clone());
            }

            self.store.insert_node(&node)?;
            stats.nodes_added += 1;

            let outcome = edge_weaver.weave(self.store, &node_id, &content)?;
            stats.edges_added += outcome.inserted;
            stats.edges_rejected += outcome.rejected.len();
        }

        Ok(stats)
    }

    /// Scan for `<!-- locus:ID -->` markers. If none found, fall back to
    /// [`BentoBoxer`] to segment the file along its own heading structure
    /// (spec.md §8 scenario 1: a file with three H2 sections and no
    /// markers yields three nodes, not one) rather than treating the
    /// whole file as a single box — a file only degrades to one box when
    /// it has no heading structure for the boxer to split on either.
    fn locate_boxes(&self, body: &str, _filename: &str) -> Vec<(String, String)> {
        let marks: Vec<_> = LOCUS_MARKER.captures_iter(body).collect();
        if marks.is_empty() {
            let boxer = BentoBoxer::default();
            return boxer
                .process(self.ledger, body)
                .into_iter()
                .map(|b| (b.id, b.content))
                .collect();
        }

        let mut boxes = Vec::with_capacity(marks.len());
        let mut positions: Vec<(String, usize, usize)> = Vec::new();
        for cap in &marks {
            let whole = cap.get(0).unwrap();
            positions.push((cap[1].to_string(), whole.start(), whole.end()));
        }
        for (i, (id, _start, content_start)) in positions.iter().enumerate() {
            let content_end = positions
                .get(i + 1)
                .map(|(_, next_start, _)| *next_start)
                .unwrap_or(body.len());
            let content = body[*content_start..content_end].trim().to_string();
            boxes.push((id.clone(), content));
        }
        boxes
    }
}

/// Infer a [`NodeType`] from the frontmatter `type` field, else a
/// directory-name heuristic, else `note` (spec.md §3/§4.11 default).
fn infer_node_type(frontmatter: &[(String, serde_json::Value)], path: &Path) -> NodeType {
    if let Some((_, value)) = frontmatter.iter().find(|(k, _)| k == "type") {
        if let Some(s) = value.as_str() {
            if let Ok(parsed) = s.to_lowercase().parse::<NodeType>() {
                return parsed;
            }
        }
    }

    let path_str = path.to_string_lossy().to_lowercase();
    if path_str.contains("debrief") {
        NodeType::Debrief
    } else if path_str.contains("playbook") {
        NodeType::Playbook
    } else if path_str.contains("document") {
        NodeType::Document
    } else {
        NodeType::Note
    }
}
