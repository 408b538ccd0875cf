use crate::error::{GraphError, Result};
use crate::types::{Edge, GraphNode, MergedGraph};
use docustitch_sections::{normalize_sec_id, SectionSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Edge weights used by the merge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeWeights {
    pub w_explicit: f32,

    /// Multiplies the similarity score; used flat when an edge has no score
    pub w_implicit: f32,
}

impl Default for MergeWeights {
    fn default() -> Self {
        Self {
            w_explicit: 1.0,
            w_implicit: 0.4,
        }
    }
}

impl MergeWeights {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("w_explicit", self.w_explicit), ("w_implicit", self.w_implicit)] {
            if !value.is_finite() || value < 0.0 {
                return Err(GraphError::InvalidWeight { name, value });
            }
        }
        Ok(())
    }
}

/// Combines explicit and implicit edges into one weighted graph.
///
/// One edge survives per `(src, dst)`: the heavier one, with the explicit
/// edge kept on equal weight. Edges are returned by weight descending, ties
/// in first-seen order (explicit edges are seen first).
#[derive(Debug, Clone, Default)]
pub struct GraphMerger {
    weights: MergeWeights,
}

impl GraphMerger {
    pub fn new(weights: MergeWeights) -> Self {
        Self { weights }
    }

    fn weight_of(&self, edge: &Edge) -> f32 {
        if edge.is_explicit() {
            self.weights.w_explicit
        } else {
            edge.score
                .map_or(self.weights.w_implicit, |s| self.weights.w_implicit * s)
        }
    }

    pub fn merge(&self, sections: &SectionSet, explicit: &[Edge], implicit: &[Edge]) -> MergedGraph {
        let mut merged: Vec<Edge> = Vec::new();
        let mut slots: HashMap<(String, String), usize> = HashMap::new();
        let mut dropped = 0usize;

        for edge in explicit.iter().chain(implicit) {
            let src = normalize_sec_id(&edge.src_sec_id);
            let dst = normalize_sec_id(&edge.dst_sec_id);
            if src == dst || !sections.contains(&src) || !sections.contains(&dst) {
                dropped += 1;
                continue;
            }

            let mut candidate = edge.clone();
            candidate.weight = self.weight_of(edge);
            candidate.src_sec_id = src.clone();
            candidate.dst_sec_id = dst.clone();

            match slots.get(&(src.clone(), dst.clone())) {
                Some(&slot) => {
                    let current = &merged[slot];
                    let wins = candidate.weight > current.weight
                        || (candidate.weight == current.weight
                            && candidate.is_explicit()
                            && !current.is_explicit());
                    if wins {
                        merged[slot] = candidate;
                    }
                }
                None => {
                    slots.insert((src, dst), merged.len());
                    merged.push(candidate);
                }
            }
        }

        merged.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));

        let mut in_weight = vec![0.0f32; sections.len()];
        let mut out_weight = vec![0.0f32; sections.len()];
        for edge in &merged {
            if let Some(i) = sections.position(&edge.src_sec_id) {
                out_weight[i] += edge.weight;
            }
            if let Some(i) = sections.position(&edge.dst_sec_id) {
                in_weight[i] += edge.weight;
            }
        }
        let max_in = in_weight.iter().copied().fold(0.0f32, f32::max);

        let nodes: Vec<GraphNode> = sections
            .iter()
            .enumerate()
            .map(|(i, section)| GraphNode {
                sec_id: section.sec_id.clone(),
                in_weight: in_weight[i],
                out_weight: out_weight[i],
                centrality: if max_in > 0.0 { in_weight[i] / max_in } else { 0.0 },
            })
            .collect();

        log::info!(
            "Merged graph: {} nodes, {} edges ({} dropped)",
            nodes.len(),
            merged.len(),
            dropped
        );

        MergedGraph::new(nodes, merged)
    }
}
