use crate::error::{Result, SummaryError};
use crate::waypoints::Waypoint;
use docustitch_graph::MergedGraph;
use docustitch_sections::normalize_sec_id;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Anchor,
    Neighbor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchedItem {
    pub sec_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// New neighbours appended after each anchor
    pub k_per_anchor: usize,

    /// Multiplier on destination centrality when ranking neighbours
    pub centrality_weight: f64,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            k_per_anchor: 3,
            centrality_weight: 0.25,
        }
    }
}

impl StitchConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.centrality_weight.is_finite() || self.centrality_weight < 0.0 {
            return Err(SummaryError::invalid_config(format!(
                "stitch.centrality_weight must be finite and non-negative, got {}",
                self.centrality_weight
            )));
        }
        Ok(())
    }
}

/// Orders anchors and their strongest graph neighbours into one sequence
/// in which every section id appears at most once.
#[derive(Debug, Clone, Default)]
pub struct Stitcher {
    config: StitchConfig,
}

impl Stitcher {
    pub fn new(config: StitchConfig) -> Self {
        Self { config }
    }

    pub fn stitch(&self, waypoints: &[Waypoint], graph: &MergedGraph) -> Vec<StitchedItem> {
        let mut anchors: Vec<&Waypoint> = waypoints.iter().collect();
        anchors.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let mut plan = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for waypoint in anchors {
            let anchor = normalize_sec_id(&waypoint.sec_id);
            if seen.insert(anchor.clone()) {
                plan.push(StitchedItem {
                    sec_id: anchor.clone(),
                    role: Role::Anchor,
                });
            }

            let mut neighbours: Vec<(&str, f64)> = graph
                .outgoing(&anchor)
                .map(|edge| {
                    let prior = f64::from(edge.weight)
                        + self.config.centrality_weight * f64::from(graph.centrality(&edge.dst_sec_id));
                    (edge.dst_sec_id.as_str(), prior)
                })
                .collect();
            neighbours.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

            let mut added = 0;
            for (dst, _) in neighbours {
                if added == self.config.k_per_anchor {
                    break;
                }
                if seen.insert(dst.to_string()) {
                    plan.push(StitchedItem {
                        sec_id: dst.to_string(),
                        role: Role::Neighbor,
                    });
                    added += 1;
                }
            }
        }

        log::info!(
            "Stitched {} items from {} anchors",
            plan.len(),
            waypoints.len()
        );
        plan
    }
}
