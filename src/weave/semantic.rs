//! SemanticWeaver (C10): orphan rescue via similarity search.
//!
//! Runs after [`super::timeline::TimelineWeaver`] so fresh timeline edges
//! already count toward "has a neighbor" (spec.md §5 ordering guarantee).

use tracing::{debug, info};

use crate::graph::{Domain, Edge, NodeType};
use crate::storage::{GraphStore, StorageResult};

use super::louvain_gate::LouvainGate;

/// Similarity threshold and candidate count above which an orphan gets a
/// `RELATED_TO` edge (spec.md §4.10, §9: exposed as a tunable with the
/// spec default `0.85`).
pub struct SemanticWeaver {
    threshold: f32,
    gate: LouvainGate,
}

impl Default for SemanticWeaver {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            gate: LouvainGate::default(),
        }
    }
}

impl SemanticWeaver {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            gate: LouvainGate::default(),
        }
    }

    pub fn with_gate(mut self, gate: LouvainGate) -> Self {
        self.gate = gate;
        self
    }

    /// For every embedded node with zero incident edges (excluding
    /// `root`/`domain` structural nodes), find its best `experience`-domain
    /// match and, if it scores above threshold, add a single `RELATED_TO`
    /// edge gated through [`LouvainGate`] like every other non-Timeline
    /// edge insertion (spec.md §4.8).
    pub fn run(&self, store: &dyn GraphStore) -> StorageResult<usize> {
        let candidates = store.nodes_with_embedding()?;
        // Orphan status is decided once from a pass-start snapshot: an edge
        // this pass inserts for one orphan must not disqualify another
        // orphan later in the same pass (spec.md §4.10 describes the
        // candidate set as "every node with ... zero incident edges", not
        // a condition re-evaluated after each rescue).
        let mut orphans = Vec::new();
        for node in candidates {
            if matches!(node.node_type, NodeType::Root | NodeType::Domain) {
                continue;
            }
            if node.embedding.is_none() {
                continue;
            }
            if store.edge_degree(&node.id)? == 0 {
                orphans.push(node);
            }
        }

        let mut inserted = 0;
        for node in orphans {
            let Some(embedding) = &node.embedding else {
                continue;
            };

            let hits = store.find_similar(embedding, 3, Some(Domain::Experience))?;
            let best = hits
                .into_iter()
                .filter(|hit| hit.id != node.id && hit.score > self.threshold)
                .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));

            let Some(best) = best else {
                continue;
            };

            let decision = self.gate.check(store, &node.id, &best.id)?;
            if !decision.allowed {
                let reason = decision.reason.unwrap_or_default();
                info!(source = %node.id, target = %best.id, reason, "LouvainGate rejected RELATED_TO rescue edge");
                continue;
            }

            let edge = Edge::new(node.id.clone(), best.id.clone(), "RELATED_TO");
            if store.insert_edge(&edge)? {
                inserted += 1;
            } else {
                debug!(source = %node.id, target = %best.id, "RELATED_TO edge already present");
            }
        }

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Layer, Node, NodeId};
    use crate::storage::{OpenStore, SqliteStore};

    fn embedded_note(id: &str, embedding: Vec<f32>) -> Node {
        Node::new(
            NodeId::from_string(id),
            NodeType::Note,
            Domain::Experience,
            Layer::Note,
        )
        .with_embedding(embedding)
    }

    #[test]
    fn rescues_an_orphan_with_a_close_match() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_node(&embedded_note("a", vec![1.0, 0.0])).unwrap();
        store.insert_node(&embedded_note("b", vec![0.999, 0.045])).unwrap();

        let inserted = SemanticWeaver::default().run(&store).unwrap();
        assert_eq!(inserted, 2);
    }

    #[test]
    fn does_not_rescue_a_node_that_already_has_an_edge() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_node(&embedded_note("a", vec![1.0, 0.0])).unwrap();
        store.insert_node(&embedded_note("b", vec![0.999, 0.045])).unwrap();
        store
            .insert_edge(&Edge::new(
                NodeId::from_string("a"),
                NodeId::from_string("b"),
                "CITES",
            ))
            .unwrap();

        let inserted = SemanticWeaver::default().run(&store).unwrap();
        assert_eq!(inserted, 0);
    }

    #[test]
    fn skips_dissimilar_nodes_below_threshold() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_node(&embedded_note("a", vec![1.0, 0.0])).unwrap();
        store.insert_node(&embedded_note("b", vec![0.0, 1.0])).unwrap();

        let inserted = SemanticWeaver::default().run(&store).unwrap();
        assert_eq!(inserted, 0);
    }

    #[test]
    fn rejects_rescue_edge_to_a_super_node_with_no_shared_neighbor() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_node(&embedded_note("a", vec![1.0, 0.0])).unwrap();
        store.insert_node(&embedded_note("h", vec![0.999, 0.045])).unwrap();
        for i in 0..60 {
            let filler = format!("filler-{i}");
            store.insert_node(&embedded_note(&filler, vec![0.0, 1.0])).unwrap();
            store
                .insert_edge(&Edge::new(
                    NodeId::from_string(filler),
                    NodeId::from_string("h"),
                    "RELATED_TO",
                ))
                .unwrap();
        }

        // `h` is now a super-node w.r.t. the default threshold (50), and
        // shares no neighbor with the orphan `a`, so the gate must reject
        // the rescue edge `a --RELATED_TO--> h` even though its similarity
        // score clears the semantic threshold.
        let inserted = SemanticWeaver::default()
            .with_gate(LouvainGate::new(50))
            .run(&store)
            .unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(
            store.get_edges_from(&NodeId::from_string("a")).unwrap().len(),
            0
        );
    }
}
