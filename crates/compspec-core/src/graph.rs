//! # Graph Store
//!
//! The node/edge structure underneath the compatibility graph.
//!
//! Nodes are keyed by their dotted id and edges are kept in an ordered set, so
//! inserting the same node or edge twice is a no-op and every iteration is
//! deterministic. The store never removes anything.
//!
//! `GraphDocument` is the JSON shape shared by schema documents and the graph
//! cache: a node map keyed by id and an edge list.

use crate::primitives::CONTAINS_RELATION;
use crate::{Edge, Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// GRAPH IMPLEMENTATION
// =============================================================================

/// Append-only graph of nodes and `contains` edges.
///
/// Uses `BTreeMap`/`BTreeSet` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    /// Node storage: NodeId -> Node
    nodes: BTreeMap<NodeId, Node>,

    /// Edge storage, ordered by (source, target, relation)
    edges: BTreeSet<Edge>,
}

impl Graph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node without metadata. Returns `false` if it already existed.
    pub fn add_node(&mut self, id: NodeId) -> bool {
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.nodes.insert(id.clone(), Node::new(id));
        true
    }

    /// Insert a node with its metadata, keeping an existing node untouched.
    pub fn insert_node(&mut self, node: Node) -> bool {
        if self.nodes.contains_key(&node.label) {
            return false;
        }
        self.nodes.insert(node.label.clone(), node);
        true
    }

    /// Insert an edge. Returns `false` if the identical edge already existed.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        self.edges.insert(edge)
    }

    /// Check if a node exists.
    #[must_use]
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Check if `source -> target` exists with the `contains` relation.
    #[must_use]
    pub fn contains_edge(&self, source: &NodeId, target: &NodeId) -> bool {
        self.edges
            .contains(&Edge::contains(source.clone(), target.clone()))
    }

    /// Targets of all edges leaving `source`, in order.
    pub fn children<'a>(&'a self, source: &'a NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.edges
            .iter()
            .filter(move |e| &e.source == source)
            .map(|e| &e.target)
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All edges in order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Get the total number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get the total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

// =============================================================================
// GRAPH DOCUMENT (JSON Graph Format)
// =============================================================================

/// A node entry in a graph document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// An edge entry in a graph document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDocument {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// Serializable node map plus edge list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeDocument>,
    #[serde(default)]
    pub edges: Vec<EdgeDocument>,
}

impl From<&Graph> for GraphDocument {
    fn from(graph: &Graph) -> Self {
        let nodes = graph
            .nodes()
            .map(|node| {
                (
                    node.label.as_str().to_string(),
                    NodeDocument {
                        label: Some(node.label.as_str().to_string()),
                        metadata: node.metadata.clone(),
                    },
                )
            })
            .collect();

        let edges = graph
            .edges()
            .map(|edge| EdgeDocument {
                source: edge.source.as_str().to_string(),
                target: edge.target.as_str().to_string(),
                relation: Some(edge.relation.clone()),
            })
            .collect();

        Self {
            id: None,
            nodes,
            edges,
        }
    }
}

impl From<GraphDocument> for Graph {
    fn from(doc: GraphDocument) -> Self {
        let mut graph = Graph::new();

        // Node labels are ignored: the map key is the id.
        for (id, node) in doc.nodes {
            graph.insert_node(Node {
                label: NodeId::new(id),
                metadata: node.metadata,
            });
        }

        for edge in doc.edges {
            let source = NodeId::new(edge.source);
            let target = NodeId::new(edge.target);
            graph.add_node(source.clone());
            graph.add_node(target.clone());
            graph.add_edge(Edge {
                source,
                target,
                relation: edge
                    .relation
                    .unwrap_or_else(|| CONTAINS_RELATION.to_string()),
            });
        }

        graph
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s)
    }

    #[test]
    fn duplicate_node_is_noop() {
        let mut graph = Graph::new();
        assert!(graph.add_node(id("a")));
        assert!(!graph.add_node(id("a")));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn duplicate_edge_is_noop() {
        let mut graph = Graph::new();
        assert!(graph.add_edge(Edge::contains(id("a"), id("a.b"))));
        assert!(!graph.add_edge(Edge::contains(id("a"), id("a.b"))));
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.contains_edge(&id("a"), &id("a.b")));
        assert!(!graph.contains_edge(&id("a.b"), &id("a")));
    }

    #[test]
    fn children_are_ordered() {
        let mut graph = Graph::new();
        graph.add_edge(Edge::contains(id("r"), id("r.z")));
        graph.add_edge(Edge::contains(id("r"), id("r.a")));
        graph.add_edge(Edge::contains(id("x"), id("x.b")));

        let root = id("r");
        let children: Vec<_> = graph.children(&root).cloned().collect();
        assert_eq!(children, vec![id("r.a"), id("r.z")]);
    }

    #[test]
    fn document_conversion_preserves_structure() {
        let mut graph = Graph::new();
        graph.add_node(id("root"));
        graph.add_node(id("root.s"));
        graph.add_edge(Edge::contains(id("root"), id("root.s")));

        let doc = GraphDocument::from(&graph);
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.edges.len(), 1);

        let restored = Graph::from(doc);
        assert_eq!(restored, graph);
    }

    #[test]
    fn dangling_edge_endpoints_become_nodes() {
        let doc = GraphDocument {
            id: Some("s".into()),
            nodes: BTreeMap::new(),
            edges: vec![EdgeDocument {
                source: "a".into(),
                target: "b".into(),
                relation: None,
            }],
        };

        let graph = Graph::from(doc);
        assert!(graph.contains_node(&id("a")));
        assert!(graph.contains_node(&id("b")));
        assert!(graph.contains_edge(&id("a"), &id("b")));
    }
}
