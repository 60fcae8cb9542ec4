//! LouvainGate (C8): local-modularity edge admission control.
//!
//! Named after the Louvain community-detection heuristic it approximates
//! cheaply: rather than recomputing modularity, it asks "would this edge
//! attach an arbitrary node to a hub with which it shares no context?"
//! (spec.md §4.8).

use crate::graph::NodeId;
use crate::storage::{GraphStore, StorageResult};

/// Result of [`LouvainGate::check`].
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl GateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Degree threshold and neighbor check above which a target is treated as
/// a super-node (spec.md §4.8, §9: exposed as a tunable with the spec
/// default of `50`).
pub struct LouvainGate {
    threshold: usize,
}

impl Default for LouvainGate {
    fn default() -> Self {
        Self { threshold: 50 }
    }
}

impl LouvainGate {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// `allowed = true` unless `target` is a super-node (incident edges >
    /// threshold) AND `source`/`target` share no neighbor. Called for every
    /// non-Timeline edge insertion (spec.md §4.8).
    pub fn check(
        &self,
        store: &dyn GraphStore,
        source: &NodeId,
        target: &NodeId,
    ) -> StorageResult<GateDecision> {
        let target_degree = store.edge_degree(target)?;
        if target_degree <= self.threshold {
            return Ok(GateDecision::allow());
        }

        if store.shares_neighbor(source, target)? {
            return Ok(GateDecision::allow());
        }

        Ok(GateDecision::reject(format!(
            "target {target} is a super-node (degree {target_degree} > {}) \
             with no neighbor shared with {source}",
            self.threshold
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Domain, Layer, Node, NodeType};
    use crate::storage::{OpenStore, SqliteStore};

    fn node(id: &str) -> Node {
        Node::new(
            NodeId::from_string(id),
            NodeType::Note,
            Domain::Experience,
            Layer::Note,
        )
    }

    #[test]
    fn allows_edges_to_a_target_under_threshold() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_node(&node("s")).unwrap();
        store.insert_node(&node("t")).unwrap();
        let gate = LouvainGate::new(50);
        let decision = gate
            .check(&store, &NodeId::from_string("s"), &NodeId::from_string("t"))
            .unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn rejects_edges_to_a_super_node_with_no_shared_neighbor() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_node(&node("s")).unwrap();
        store.insert_node(&node("h")).unwrap();
        for i in 0..60 {
            let filler = format!("filler-{i}");
            store.insert_node(&node(&filler)).unwrap();
            store
                .insert_edge(&crate::graph::Edge::new(
                    NodeId::from_string(filler),
                    NodeId::from_string("h"),
                    "RELATED_TO",
                ))
                .unwrap();
        }
        let gate = LouvainGate::new(50);
        let decision = gate
            .check(&store, &NodeId::from_string("s"), &NodeId::from_string("h"))
            .unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.is_some());
    }

    #[test]
    fn allows_edges_to_a_super_node_when_a_neighbor_is_shared() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_node(&node("s")).unwrap();
        store.insert_node(&node("h")).unwrap();
        store.insert_node(&node("n")).unwrap();
        store
            .insert_edge(&crate::graph::Edge::new(
                NodeId::from_string("s"),
                NodeId::from_string("n"),
                "RELATED_TO",
            ))
            .unwrap();
        store
            .insert_edge(&crate::graph::Edge::new(
                NodeId::from_string("n"),
                NodeId::from_string("h"),
                "RELATED_TO",
            ))
            .unwrap();
        for i in 0..60 {
            let filler = format!("filler-{i}");
            store.insert_node(&node(&filler)).unwrap();
            store
                .insert_edge(&crate::graph::Edge::new(
                    NodeId::from_string(filler),
                    NodeId::from_string("h"),
                    "RELATED_TO",
                ))
                .unwrap();
        }
        let gate = LouvainGate::new(50);
        let decision = gate
            .check(&store, &NodeId::from_string("s"), &NodeId::from_string("h"))
            .unwrap();
        assert!(decision.allowed);
    }
}
