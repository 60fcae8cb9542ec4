//! Node representation in the knowledge graph (spec §3 "Node").

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a node.
///
/// Either a UUIDv4 minted by the locus ledger for experience boxes, or a
/// human-readable slug for lexicon/directive entries (e.g. `term-flow-state`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Enumerated node kind (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Concept,
    Directive,
    Document,
    Playbook,
    Debrief,
    Note,
    Section,
    Root,
    Domain,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Concept => "concept",
            NodeType::Directive => "directive",
            NodeType::Document => "document",
            NodeType::Playbook => "playbook",
            NodeType::Debrief => "debrief",
            NodeType::Note => "note",
            NodeType::Section => "section",
            NodeType::Root => "root",
            NodeType::Domain => "domain",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concept" => Ok(NodeType::Concept),
            "directive" => Ok(NodeType::Directive),
            "document" => Ok(NodeType::Document),
            "playbook" => Ok(NodeType::Playbook),
            "debrief" => Ok(NodeType::Debrief),
            "note" => Ok(NodeType::Note),
            "section" => Ok(NodeType::Section),
            "root" => Ok(NodeType::Root),
            "domain" => Ok(NodeType::Domain),
            other => Err(format!("unknown node type: {other}")),
        }
    }
}

/// Top-level content domain (spec §3, glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Persona,
    Experience,
    Knowledge,
    Lexicon,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Domain::Persona => "persona",
            Domain::Experience => "experience",
            Domain::Knowledge => "knowledge",
            Domain::Lexicon => "lexicon",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "persona" => Ok(Domain::Persona),
            "experience" => Ok(Domain::Experience),
            "knowledge" => Ok(Domain::Knowledge),
            "lexicon" => Ok(Domain::Lexicon),
            other => Err(format!("unknown domain: {other}")),
        }
    }
}

/// Ingestion layer (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Ontology,
    Directive,
    Note,
    Experience,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Layer::Ontology => "ontology",
            Layer::Directive => "directive",
            Layer::Note => "note",
            Layer::Experience => "experience",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ontology" => Ok(Layer::Ontology),
            "directive" => Ok(Layer::Directive),
            "note" => Ok(Layer::Note),
            "experience" => Ok(Layer::Experience),
            other => Err(format!("unknown layer: {other}")),
        }
    }
}

/// A node in the knowledge graph (spec §3).
///
/// `embedding` is absent for non-embeddable nodes (content length ≤ 50,
/// checked by the ingestor before calling the embedder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub title: Option<String>,
    pub content: Option<String>,
    pub domain: Domain,
    pub layer: Layer,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// MD5 hex digest of the trimmed content; empty for content-less nodes.
    pub hash: String,
    /// Opaque metadata bag (source path, semantic tokens, aliases, tags, box id, date, section).
    pub meta: Map<String, Value>,
}

impl Node {
    pub fn new(id: NodeId, node_type: NodeType, domain: Domain, layer: Layer) -> Self {
        Self {
            id,
            node_type,
            title: None,
            content: None,
            domain,
            layer,
            embedding: None,
            hash: String::new(),
            meta: Map::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(Value::as_str)
    }
}
