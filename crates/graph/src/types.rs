use crate::error::{GraphError, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Provenance class of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// Derived from an in-text citation
    Explicit,

    /// Derived from embedding similarity
    Implicit,
}

/// How an edge was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMethod {
    #[default]
    Explicit,
    ImplicitKnnWindow,
    ImplicitKnnGlobal,
    ImplicitKnnWindowBidir,
    ImplicitKnnGlobalBidir,
}

impl EdgeMethod {
    /// Mirrored counterpart used for bidirectional implicit edges
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::ImplicitKnnWindow => Self::ImplicitKnnWindowBidir,
            Self::ImplicitKnnGlobal => Self::ImplicitKnnGlobalBidir,
            other => other,
        }
    }
}

const fn one() -> u32 {
    1
}

const fn unit_weight() -> f32 {
    1.0
}

/// Directed edge between two sections of the same document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src_sec_id: String,
    pub dst_sec_id: String,
    pub edge_type: EdgeType,

    #[serde(default)]
    pub method: EdgeMethod,

    /// Constant 1.0 before merge; merged weight afterwards
    #[serde(default = "unit_weight")]
    pub weight: f32,

    /// Cosine similarity (implicit edges only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,

    /// Distinct citing spans behind an explicit edge
    #[serde(default = "one")]
    pub span_count: u32,
}

impl Edge {
    pub fn explicit(src: impl Into<String>, dst: impl Into<String>, span_count: u32) -> Self {
        Self {
            src_sec_id: src.into(),
            dst_sec_id: dst.into(),
            edge_type: EdgeType::Explicit,
            method: EdgeMethod::Explicit,
            weight: 1.0,
            score: None,
            span_count: span_count.max(1),
        }
    }

    pub fn implicit(
        src: impl Into<String>,
        dst: impl Into<String>,
        method: EdgeMethod,
        score: f32,
    ) -> Self {
        Self {
            src_sec_id: src.into(),
            dst_sec_id: dst.into(),
            edge_type: EdgeType::Implicit,
            method,
            weight: 1.0,
            score: Some(score),
            span_count: 1,
        }
    }

    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.src_sec_id == self.dst_sec_id
    }

    #[must_use]
    pub const fn is_explicit(&self) -> bool {
        matches!(self.edge_type, EdgeType::Explicit)
    }
}

/// Node of the merged graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub sec_id: String,
    pub in_weight: f32,
    pub out_weight: f32,

    /// `in_weight / max(in_weight)` over the document, in `[0, 1]`
    pub centrality: f32,
}

/// Directed section graph (petgraph) with a `sec_id -> NodeIndex` lookup
#[derive(Debug, Clone, Default)]
pub struct SectionGraph {
    pub graph: DiGraph<String, Edge>,
    index: HashMap<String, NodeIndex>,
}

impl SectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning the existing index for a known id
    pub fn add_node(&mut self, sec_id: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(sec_id) {
            return idx;
        }
        let idx = self.graph.add_node(sec_id.to_string());
        self.index.insert(sec_id.to_string(), idx);
        idx
    }

    /// Add an edge between two known nodes
    pub fn add_edge(&mut self, edge: Edge) -> Result<()> {
        let from = self
            .find_node(&edge.src_sec_id)
            .ok_or_else(|| GraphError::NodeNotFound(edge.src_sec_id.clone()))?;
        let to = self
            .find_node(&edge.dst_sec_id)
            .ok_or_else(|| GraphError::NodeNotFound(edge.dst_sec_id.clone()))?;
        self.graph.add_edge(from, to, edge);
        Ok(())
    }

    pub fn find_node(&self, sec_id: &str) -> Option<NodeIndex> {
        self.index.get(sec_id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Result of the weighted merge: every section as a node plus deduplicated edges
#[derive(Debug, Clone, Default)]
pub struct MergedGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<Edge>,
    node_index: HashMap<String, usize>,
    outgoing: HashMap<String, Vec<usize>>,
}

impl MergedGraph {
    /// Assemble from nodes (document order) and edges (weight descending)
    pub fn new(nodes: Vec<GraphNode>, edges: Vec<Edge>) -> Self {
        let node_index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.sec_id.clone(), i))
            .collect();
        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.src_sec_id.clone()).or_default().push(i);
        }
        Self {
            nodes,
            edges,
            node_index,
            outgoing,
        }
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, sec_id: &str) -> Option<&GraphNode> {
        self.node_index.get(sec_id).map(|&i| &self.nodes[i])
    }

    /// Centrality of a node; unknown ids are 0
    pub fn centrality(&self, sec_id: &str) -> f32 {
        self.node(sec_id).map_or(0.0, |n| n.centrality)
    }

    /// Outgoing edges of `sec_id` in merged order
    pub fn outgoing<'a>(&'a self, sec_id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.outgoing
            .get(sec_id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn into_parts(self) -> (Vec<GraphNode>, Vec<Edge>) {
        (self.nodes, self.edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn edge_wire_format() {
        let edge = Edge::implicit("§1.1", "§1.2", EdgeMethod::ImplicitKnnWindow, 0.5);
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["edge_type"], "implicit");
        assert_eq!(json["method"], "implicit_knn_window");
        assert_eq!(json["score"], 0.5);

        let explicit: Edge =
            serde_json::from_str(r#"{"src_sec_id":"§1.1","dst_sec_id":"§1.3","edge_type":"explicit"}"#)
                .unwrap();
        assert_eq!(explicit, Edge::explicit("§1.1", "§1.3", 1));
    }

    #[test]
    fn section_graph_rejects_unknown_nodes() {
        let mut graph = SectionGraph::new();
        graph.add_node("§1.1");
        assert_eq!(graph.add_node("§1.1"), graph.add_node("§1.1"));
        let err = graph.add_edge(Edge::explicit("§1.1", "§9.9", 1)).unwrap_err();
        assert!(matches!(err, GraphError::NodeNotFound(id) if id == "§9.9"));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn merged_graph_lookup() {
        let nodes = vec![
            GraphNode {
                sec_id: "§1.1".into(),
                in_weight: 0.0,
                out_weight: 1.0,
                centrality: 0.0,
            },
            GraphNode {
                sec_id: "§1.2".into(),
                in_weight: 1.0,
                out_weight: 0.0,
                centrality: 1.0,
            },
        ];
        let graph = MergedGraph::new(nodes, vec![Edge::explicit("§1.1", "§1.2", 1)]);
        assert_eq!(graph.centrality("§1.2"), 1.0);
        assert_eq!(graph.centrality("§7.7"), 0.0);
        assert_eq!(graph.outgoing("§1.1").count(), 1);
        assert_eq!(graph.outgoing("§1.2").count(), 0);
    }
}
