use crate::types::{Edge, SectionGraph};
use docustitch_sections::SectionSet;
use petgraph::algo::{connected_components, page_rank};
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

const DAMPING: f64 = 0.85;
const ITERATIONS: usize = 100;

/// Per-section structural metrics of the explicit citation graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub sec_id: String,
    pub pagerank: f64,
    pub in_degree: usize,
    pub out_degree: usize,

    /// Sum of `span_count` over incoming edges
    pub in_span_strength: u32,
}

/// Whole-graph diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub density: f64,
    pub components: usize,
    pub avg_clustering: f64,
}

#[derive(Debug, Clone, Default)]
pub struct GraphAnalysis {
    /// Sorted by `(pagerank, in_degree, in_span_strength)` descending
    pub nodes: Vec<NodeMetrics>,
    pub metrics: GraphMetrics,
}

/// Diagnostic analysis of explicit citation edges.
///
/// Every section becomes a node. Edges whose endpoints are not sections of
/// the document are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphAnalyzer;

impl GraphAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, sections: &SectionSet, edges: &[Edge]) -> GraphAnalysis {
        let mut graph = SectionGraph::new();
        for section in sections.iter() {
            graph.add_node(&section.sec_id);
        }
        for edge in edges {
            if edge.is_self_loop() {
                continue;
            }
            if let Err(err) = graph.add_edge(edge.clone()) {
                log::debug!(
                    "Skipping edge {} -> {}: {err}",
                    edge.src_sec_id,
                    edge.dst_sec_id
                );
            }
        }

        let ranks = page_rank(&graph.graph, DAMPING, ITERATIONS);
        let mut nodes: Vec<(usize, NodeMetrics)> = graph
            .graph
            .node_indices()
            .map(|idx| {
                let incoming = graph.graph.edges_directed(idx, Direction::Incoming);
                let (in_degree, in_span_strength) =
                    incoming.fold((0, 0), |(n, s), e| (n + 1, s + e.weight().span_count));
                (
                    idx.index(),
                    NodeMetrics {
                        sec_id: graph.graph[idx].clone(),
                        pagerank: ranks[idx.index()],
                        in_degree,
                        out_degree: graph.graph.edges_directed(idx, Direction::Outgoing).count(),
                        in_span_strength,
                    },
                )
            })
            .collect();

        nodes.sort_by(|(ia, a), (ib, b)| {
            b.pagerank
                .partial_cmp(&a.pagerank)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.in_degree.cmp(&a.in_degree))
                .then_with(|| b.in_span_strength.cmp(&a.in_span_strength))
                .then_with(|| ia.cmp(ib))
        });

        let n = graph.node_count();
        let m = graph.edge_count();
        let metrics = GraphMetrics {
            num_nodes: n,
            num_edges: m,
            density: if n < 2 {
                0.0
            } else {
                m as f64 / (n * (n - 1)) as f64
            },
            components: connected_components(&graph.graph),
            avg_clustering: average_clustering(&graph),
        };

        log::info!(
            "Built citation graph: {} nodes, {} edges, {} components",
            metrics.num_nodes,
            metrics.num_edges,
            metrics.components
        );

        GraphAnalysis {
            nodes: nodes.into_iter().map(|(_, node)| node).collect(),
            metrics,
        }
    }
}

/// Mean local clustering coefficient of the undirected projection
fn average_clustering(graph: &SectionGraph) -> f64 {
    let g = &graph.graph;
    let n = g.node_count();
    if n == 0 {
        return 0.0;
    }

    let total: f64 = g
        .node_indices()
        .map(|v| {
            let adj: Vec<NodeIndex> = g
                .neighbors_undirected(v)
                .filter(|&u| u != v)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let k = adj.len();
            if k < 2 {
                return 0.0;
            }
            let links = adj
                .iter()
                .enumerate()
                .flat_map(|(i, &a)| adj[i + 1..].iter().map(move |&b| (a, b)))
                .filter(|&(a, b)| g.find_edge_undirected(a, b).is_some())
                .count();
            (2 * links) as f64 / (k * (k - 1)) as f64
        })
        .sum();
    total / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use docustitch_sections::Section;
    use pretty_assertions::assert_eq;

    fn sections(ids: &[&str]) -> SectionSet {
        SectionSet::new(
            "doc",
            ids.iter()
                .map(|id| Section::new("doc", id, "Heading", "Body text."))
                .collect(),
        )
    }

    #[test]
    fn empty_document_yields_empty_graph() {
        let analysis = GraphAnalyzer::new().analyze(&SectionSet::default(), &[]);
        assert!(analysis.nodes.is_empty());
        assert_eq!(analysis.metrics, GraphMetrics::default());
    }

    #[test]
    fn cited_section_ranks_first() {
        let set = sections(&["§1.1", "§1.2", "§1.3", "§1.4"]);
        let edges = vec![
            Edge::explicit("§1.1", "§1.3", 2),
            Edge::explicit("§1.2", "§1.3", 1),
            Edge::explicit("§1.4", "§1.3", 1),
            Edge::explicit("§1.3", "§9.9", 1),
        ];
        let analysis = GraphAnalyzer::new().analyze(&set, &edges);

        let top = &analysis.nodes[0];
        assert_eq!(top.sec_id, "§1.3");
        assert_eq!(top.in_degree, 3);
        assert_eq!(top.in_span_strength, 4);
        assert_eq!(analysis.metrics.num_nodes, 4);
        assert_eq!(analysis.metrics.num_edges, 3);
        assert_eq!(analysis.metrics.components, 1);
        assert!((analysis.metrics.density - 0.25).abs() < 1e-12);

        let total: f64 = analysis.nodes.iter().map(|n| n.pagerank).sum();
        assert!((total - 1.0).abs() < 1e-6);

        // equal-rank leaves keep document order
        let rest: Vec<_> = analysis.nodes[1..].iter().map(|n| n.sec_id.as_str()).collect();
        assert_eq!(rest, vec!["§1.1", "§1.2", "§1.4"]);
    }

    #[test]
    fn triangle_is_fully_clustered() {
        let set = sections(&["§1.1", "§1.2", "§1.3", "§1.4"]);
        let edges = vec![
            Edge::explicit("§1.1", "§1.2", 1),
            Edge::explicit("§1.2", "§1.3", 1),
            Edge::explicit("§1.3", "§1.1", 1),
        ];
        let analysis = GraphAnalyzer::new().analyze(&set, &edges);
        // three nodes at 1.0, the isolated one at 0.0
        assert!((analysis.metrics.avg_clustering - 0.75).abs() < 1e-12);
        assert_eq!(analysis.metrics.components, 2);
    }

    #[test]
    fn dangling_sections_keep_ranks_normalized() {
        // a chain ending in a section that cites nothing
        let set = sections(&["§2.1", "§2.2", "§2.3"]);
        let edges = vec![
            Edge::explicit("§2.1", "§2.2", 1),
            Edge::explicit("§2.2", "§2.3", 1),
        ];
        let analysis = GraphAnalyzer::new().analyze(&set, &edges);

        let order: Vec<_> = analysis.nodes.iter().map(|n| n.sec_id.as_str()).collect();
        assert_eq!(order, vec!["§2.3", "§2.2", "§2.1"]);
        let total: f64 = analysis.nodes.iter().map(|n| n.pagerank).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(analysis.nodes.iter().all(|n| n.pagerank > 0.0));
    }
}
