//! TimelineWeaver (C10): chronological `SUCCEEDS` chains over debrief nodes.
//!
//! Bypasses [`super::louvain_gate::LouvainGate`] by design — chronological
//! chains are intentional structure, not semantic inference (spec.md
//! §4.10).

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::graph::{Edge, Node, NodeType};
use crate::storage::{GraphStore, StorageResult};

static DATE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").unwrap());

pub struct TimelineWeaver;

impl TimelineWeaver {
    /// Run the full pass: collect `debrief` nodes, derive a date from
    /// `meta.date` or a `YYYY-MM-DD` filename prefix, drop undated nodes,
    /// sort descending, and chain each adjacent pair with `SUCCEEDS`.
    /// Returns the number of edges inserted.
    pub fn run(&self, store: &dyn GraphStore) -> StorageResult<usize> {
        let debriefs = store.get_nodes_by_type(NodeType::Debrief)?;
        let mut dated: Vec<(NaiveDate, Node)> = debriefs
            .into_iter()
            .filter_map(|node| Self::derive_date(&node).map(|date| (date, node)))
            .collect();

        dated.sort_by(|a, b| b.0.cmp(&a.0));

        let mut inserted = 0;
        for pair in dated.windows(2) {
            let (newer, older) = (&pair[0].1, &pair[1].1);
            let edge = Edge::new(newer.id.clone(), older.id.clone(), "SUCCEEDS");
            if store.insert_edge(&edge)? {
                inserted += 1;
            } else {
                debug!(newer = %newer.id, older = %older.id, "SUCCEEDS edge already present");
            }
        }

        Ok(inserted)
    }

    fn derive_date(node: &Node) -> Option<NaiveDate> {
        if let Some(date_str) = node.meta_str("date") {
            if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
                return Some(date);
            }
        }
        let source = node.meta_str("source")?;
        let captured = DATE_PREFIX.find(source)?;
        NaiveDate::parse_from_str(captured.as_str(), "%Y-%m-%d").ok()
    }
}
