//! Edge representation for the knowledge graph (spec §3 "Edge").

use super::node::NodeId;
use serde::{Deserialize, Serialize};

/// A directed, typed relation between two nodes.
///
/// `(source, target, type)` is the composite primary key (invariant I5:
/// inserting the same triple twice leaves one row). Targets need not exist
/// at insert time — dangling edges are permitted and later flagged by the
/// validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    /// Uppercase relation label, e.g. `TAGGED_AS`, `CITES`, `SUCCEEDS`.
    #[serde(rename = "type")]
    pub edge_type: String,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId, edge_type: impl Into<String>) -> Self {
        Self {
            source,
            target,
            edge_type: edge_type.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_with_identical_triples_compare_equal() {
        let a = Edge::new(NodeId::from_string("s"), NodeId::from_string("t"), "CITES");
        let b = Edge::new(NodeId::from_string("s"), NodeId::from_string("t"), "CITES");
        assert_eq!(a, b);
    }
}
