//! EdgeWeaver (C9): parse explicit tags/wikilinks from content into edges.
//!
//! Strict mode only — no fuzzy inference (spec.md §4.9). Grounded in the
//! teacher's `adapter::tag_bridger` regex-driven tag-parsing design,
//! generalized to the four signal kinds spec.md §4.9 enumerates.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::graph::{Edge, NodeId};
use crate::storage::{GraphStore, StorageResult};

use super::louvain_gate::LouvainGate;

/// Lowercase, collapse non-alphanumeric runs to a single `-`, trim leading
/// and trailing `-` (spec.md §4.9).
pub fn slugify(input: &str) -> String {
    static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
    let lowered = input.to_lowercase();
    let collapsed = NON_ALNUM.replace_all(&lowered, "-");
    collapsed.trim_matches('-').to_string()
}

#[derive(Debug, Clone)]
pub struct EdgeWeaverConfig {
    /// Whether legacy `tag-<slug>` stubs still emit `EXEMPLIFIES` edges
    /// (spec.md §9 open question; SPEC_FULL §5 default `true`).
    pub emit_legacy_exemplifies: bool,
}

impl Default for EdgeWeaverConfig {
    fn default() -> Self {
        Self {
            emit_legacy_exemplifies: true,
        }
    }
}

/// Outcome of weaving one node's content.
#[derive(Debug, Clone, Default)]
pub struct WeaveOutcome {
    pub inserted: usize,
    pub rejected: Vec<String>,
}

static INLINE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[Tag:\s*([^\]]+)\]").unwrap());
static LEGACY_STUB: Lazy<Regex> = Lazy::new(|| Regex::new(r"\btag-([a-z0-9-]+)\b").unwrap());
static METADATA_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--\s*tags:\s*([^>]*?)\s*-->").unwrap());
static METADATA_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]:]+):\s*([^\]]+)\]").unwrap());
static WIKILINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[([^\]|]+)(?:\|[^\]]+)?\]\]").unwrap());

/// Constructed once per ingestion run against the lexicon snapshot seeded
/// in Phase 1 (spec.md §5: "the lexicon (immutable after Phase 1
/// seeding)") and reused across Phase 2 files.
pub struct EdgeWeaver {
    lexicon_ids: HashSet<String>,
    gate: LouvainGate,
    config: EdgeWeaverConfig,
}

impl EdgeWeaver {
    pub fn new(lexicon_ids: HashSet<String>, gate: LouvainGate, config: EdgeWeaverConfig) -> Self {
        Self {
            lexicon_ids,
            gate,
            config,
        }
    }

    /// Scan `content` for tag/stub/metadata/wikilink signals and emit
    /// edges from `source`, each gated through [`LouvainGate`].
    pub fn weave(
        &self,
        store: &dyn GraphStore,
        source: &NodeId,
        content: &str,
    ) -> StorageResult<WeaveOutcome> {
        let mut outcome = WeaveOutcome::default();

        for capture in INLINE_TAG.captures_iter(content) {
            let slug = slugify(&capture[1]);
            if self.lexicon_ids.contains(&slug) {
                self.try_insert(store, source, &slug, "TAGGED_AS", &mut outcome)?;
            }
        }

        if self.config.emit_legacy_exemplifies {
            for capture in LEGACY_STUB.captures_iter(content) {
                let slug = capture[1].to_string();
                if self.lexicon_ids.contains(&slug) {
                    self.try_insert(store, source, &slug, "EXEMPLIFIES", &mut outcome)?;
                }
            }
        }

        for block in METADATA_BLOCK.captures_iter(content) {
            for pair in METADATA_PAIR.captures_iter(&block[1]) {
                let key = pair[1].trim();
                let value = pair[2].trim();
                if key.eq_ignore_ascii_case("quality") || key.starts_with('#') {
                    continue;
                }
                let relation = key.to_uppercase().replace([' ', '-'], "_");
                self.try_insert(store, source, value, &relation, &mut outcome)?;
            }
        }

        for capture in WIKILINK.captures_iter(content) {
            let slug = slugify(&capture[1]);
            if self.lexicon_ids.contains(&slug) {
                self.try_insert(store, source, &slug, "CITES", &mut outcome)?;
            }
        }

        Ok(outcome)
    }

    fn try_insert(
        &self,
        store: &dyn GraphStore,
        source: &NodeId,
        target: &str,
        relation: &str,
        outcome: &mut WeaveOutcome,
    ) -> StorageResult<()> {
        let target_id = NodeId::from_string(target);
        let decision = self.gate.check(store, source, &target_id)?;
        if !decision.allowed {
            let reason = decision.reason.unwrap_or_default();
            info!(%source, %target, relation, reason, "LouvainGate rejected edge");
            outcome.rejected.push(reason);
            return Ok(());
        }
        let edge = Edge::new(source.clone(), target_id, relation);
        if store.insert_edge(&edge)? {
            outcome.inserted += 1;
        } else {
            debug!(%source, %target, relation, "edge already present");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Domain, Layer, Node, NodeType};
    use crate::storage::{OpenStore, SqliteStore};

    fn lexicon_with(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn weaver(ids: &[&str]) -> EdgeWeaver {
        EdgeWeaver::new(lexicon_with(ids), LouvainGate::new(50), EdgeWeaverConfig::default())
    }

    fn seed(store: &SqliteStore, id: &str) {
        store
            .insert_node(&Node::new(
                NodeId::from_string(id),
                NodeType::Note,
                Domain::Experience,
                Layer::Note,
            ))
            .unwrap();
    }

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("Flow State!!"), "flow-state");
        assert_eq!(slugify("--Edge Case--"), "edge-case");
    }

    #[test]
    fn inline_tag_resolves_against_lexicon() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed(&store, "note-1");
        seed(&store, "term-flow-state");
        let weaver = weaver(&["term-flow-state"]);
        let outcome = weaver
            .weave(
                &store,
                &NodeId::from_string("note-1"),
                "Today I noticed [Tag: Term Flow State].",
            )
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        let edges = store.get_edges_from(&NodeId::from_string("note-1")).unwrap();
        assert_eq!(edges[0].edge_type, "TAGGED_AS");
    }

    #[test]
    fn legacy_stub_emits_exemplifies_when_enabled() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed(&store, "note-1");
        seed(&store, "flow-state");
        let weaver = weaver(&["flow-state"]);
        let outcome = weaver
            .weave(
                &store,
                &NodeId::from_string("note-1"),
                "See tag-flow-state for details.",
            )
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        let edges = store.get_edges_from(&NodeId::from_string("note-1")).unwrap();
        assert_eq!(edges[0].edge_type, "EXEMPLIFIES");
    }

    #[test]
    fn unresolved_wikilink_is_ignored_without_a_ghost_edge() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed(&store, "note-1");
        let weaver = weaver(&[]);
        let outcome = weaver
            .weave(&store, &NodeId::from_string("note-1"), "See [[Unknown Thing]].")
            .unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(store.edge_count().unwrap(), 0);
    }

    #[test]
    fn wikilink_resolves_to_cites() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed(&store, "note-1");
        seed(&store, "term-flow-state");
        let weaver = weaver(&["term-flow-state"]);
        let outcome = weaver
            .weave(&store, &NodeId::from_string("note-1"), "See [[Term Flow State|here]].")
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        let edges = store.get_edges_from(&NodeId::from_string("note-1")).unwrap();
        assert_eq!(edges[0].edge_type, "CITES");
    }

    #[test]
    fn metadata_block_emits_custom_relation_verbatim_target() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed(&store, "note-1");
        seed(&store, "term-bar");
        let weaver = weaver(&[]);
        let outcome = weaver
            .weave(
                &store,
                &NodeId::from_string("note-1"),
                "<!-- tags: [CITES: term-bar], [quality: high] -->",
            )
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        let edges = store.get_edges_from(&NodeId::from_string("note-1")).unwrap();
        assert_eq!(edges[0].edge_type, "CITES");
        assert_eq!(edges[0].target.as_str(), "term-bar");
    }
}
