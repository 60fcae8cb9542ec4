//! Core graph data structures (spec §3 "Node" / "Edge").

mod edge;
mod node;

pub use edge::Edge;
pub use node::{Domain, Layer, Node, NodeId, NodeType};
