use crate::error::{Result, SummaryError};
use crate::terms::{round6, TermRecord};
use docustitch_citations::Reference;
use docustitch_graph::Edge;
use docustitch_sections::{normalize_sec_id, Lexicon, SectionSet};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Reason tag attached to every waypoint
pub const WAYPOINT_REASON: &str = "blend(term_density,lexicon,centrality,heading,xref)";

static ANCHOR_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(purpose|scope|authority|compliance|reporting)\b")
        .expect("valid anchor heading regex")
});

/// Linear blend weights; they need not sum to one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub term: f64,
    pub lexicon: f64,
    pub centrality: f64,
    pub heading: f64,
    pub xref: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            term: 0.45,
            lexicon: 0.25,
            centrality: 0.20,
            heading: 0.05,
            xref: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaypointConfig {
    /// Number of anchors to keep
    pub k: usize,

    /// Exploration window recorded on each anchor
    pub window: usize,

    pub weights: SignalWeights,
}

impl Default for WaypointConfig {
    fn default() -> Self {
        Self {
            k: 12,
            window: 1,
            weights: SignalWeights::default(),
        }
    }
}

impl WaypointConfig {
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        for (name, value) in [
            ("term", w.term),
            ("lexicon", w.lexicon),
            ("centrality", w.centrality),
            ("heading", w.heading),
            ("xref", w.xref),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SummaryError::invalid_config(format!(
                    "waypoint weight '{name}' must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// A section selected as a summarization anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub sec_id: String,
    pub score: f64,
    pub window: usize,
    pub reason: String,
}

/// Upstream artifacts feeding the salience signals
#[derive(Debug, Clone, Copy)]
pub struct SalienceInputs<'a> {
    pub terms: &'a [TermRecord],
    pub references: &'a [Reference],
    pub explicit_edges: &'a [Edge],
    pub lexicon: &'a Lexicon,
}

/// Min-max scale to `[0, 1]`; a constant signal maps to all zeros
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() || hi - lo <= 1e-9 * hi.abs().max(lo.abs()) {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - lo) / (hi - lo)).collect()
}

/// Case-insensitive whole-phrase matcher; inner spaces also match hyphens
fn phrase_regex(term: &str) -> Option<Regex> {
    let parts: Vec<String> = term
        .split_whitespace()
        .map(|w| regex::escape(&w.to_lowercase()))
        .collect();
    if parts.is_empty() {
        return None;
    }
    let pattern = format!(r"(?i)(?:^|\W){}(?:\W|$)", parts.join(r"[\s\-]+"));
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            log::debug!("Skipping lexicon term '{term}': {err}");
            None
        }
    }
}

/// Blends per-section salience signals and keeps the top-K sections.
///
/// Signals: term weight (`tfidf_sum`), lexicon phrase hits, explicit-edge
/// in-degree, heading bonus and local cross-reference count. Each is min-max
/// normalized across the document before weighting. Ties keep document order.
#[derive(Debug, Clone, Default)]
pub struct WaypointScorer {
    config: WaypointConfig,
}

impl WaypointScorer {
    pub fn new(config: WaypointConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, sections: &SectionSet, inputs: SalienceInputs<'_>) -> Result<Vec<Waypoint>> {
        if sections.is_empty() {
            log::info!("No sections; no waypoints");
            return Ok(Vec::new());
        }

        let term_by_id: HashMap<String, f64> = inputs
            .terms
            .iter()
            .map(|t| (normalize_sec_id(&t.sec_id), t.tfidf_sum))
            .collect();
        let term: Vec<f64> = sections
            .iter()
            .map(|s| term_by_id.get(&s.sec_id).copied().unwrap_or(0.0))
            .collect();

        let phrases: Vec<Regex> = inputs
            .lexicon
            .terms_for(sections.doc_id())
            .into_iter()
            .filter_map(phrase_regex)
            .collect();
        let lexicon: Vec<f64> = sections
            .iter()
            .map(|s| {
                let hay = format!("{}\n{}", s.heading, s.text.replace('\r', "").trim()).to_lowercase();
                phrases.iter().filter(|re| re.is_match(&hay)).count() as f64
            })
            .collect();

        let mut in_degree: HashMap<String, f64> = HashMap::new();
        for edge in inputs.explicit_edges {
            *in_degree.entry(normalize_sec_id(&edge.dst_sec_id)).or_default() += 1.0;
        }
        let centrality: Vec<f64> = sections
            .iter()
            .map(|s| in_degree.get(&s.sec_id).copied().unwrap_or(0.0))
            .collect();

        let patterns = inputs.lexicon.heading_patterns()?;
        let heading: Vec<f64> = sections
            .iter()
            .map(|s| {
                let h = s.heading.trim();
                if h.is_empty() {
                    0.0
                } else if patterns.definitions.is_match(h) || patterns.applicability.is_match(h) {
                    1.0
                } else if ANCHOR_HEADING.is_match(h) {
                    0.5
                } else {
                    0.0
                }
            })
            .collect();

        let xref_by_id: HashMap<String, f64> = inputs
            .references
            .iter()
            .map(|r| (normalize_sec_id(&r.sec_id), r.local_refs().count() as f64))
            .collect();
        let xref: Vec<f64> = sections
            .iter()
            .map(|s| xref_by_id.get(&s.sec_id).copied().unwrap_or(0.0))
            .collect();

        let w = self.config.weights;
        let blended = [
            (w.term, &term[..]),
            (w.lexicon, &lexicon[..]),
            (w.centrality, &centrality[..]),
            (w.heading, &heading[..]),
            (w.xref, &xref[..]),
        ];
        let mut scores = vec![0.0f64; sections.len()];
        for (weight, raw) in blended {
            for (score, value) in scores.iter_mut().zip(min_max_normalize(raw)) {
                *score += weight * value;
            }
        }

        let mut ranked: Vec<Waypoint> = sections
            .iter()
            .zip(scores)
            .map(|(section, score)| Waypoint {
                sec_id: section.sec_id.clone(),
                score: round6(score),
                window: self.config.window,
                reason: WAYPOINT_REASON.to_string(),
            })
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked.truncate(self.config.k);

        log::info!(
            "Selected {} waypoints from {} sections",
            ranked.len(),
            sections.len()
        );
        for waypoint in &ranked {
            log::debug!("  {} score={:.3}", waypoint.sec_id, waypoint.score);
        }
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docustitch_sections::Section;
    use pretty_assertions::assert_eq;

    fn set(rows: &[(&str, &str, &str)]) -> SectionSet {
        SectionSet::new(
            "doc",
            rows.iter()
                .map(|(id, h, t)| Section::new("doc", id, *h, *t))
                .collect(),
        )
    }

    fn no_inputs(lexicon: &Lexicon) -> SalienceInputs<'_> {
        SalienceInputs {
            terms: &[],
            references: &[],
            explicit_edges: &[],
            lexicon,
        }
    }

    #[test]
    fn normalization_handles_constant_signals() {
        assert_eq!(min_max_normalize(&[2.0, 4.0, 3.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(min_max_normalize(&[5.0, 5.0]), vec![0.0, 0.0]);
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn single_section_scores_zero() {
        let lexicon = Lexicon::default();
        let sections = set(&[("§1.1", "Definitions", "Terms used in this part.")]);
        let waypoints = WaypointScorer::default()
            .score(&sections, no_inputs(&lexicon))
            .unwrap();
        assert_eq!(
            waypoints,
            vec![Waypoint {
                sec_id: "§1.1".into(),
                score: 0.0,
                window: 1,
                reason: WAYPOINT_REASON.into(),
            }]
        );
    }

    #[test]
    fn blended_signals_rank_sections() {
        let lexicon = Lexicon {
            global_terms: vec!["driver license".into()],
            ..Lexicon::default()
        };
        let sections = set(&[
            ("§37.1", "Scope", "Covers issuance."),
            ("§37.2", "Definitions", "A driver-license is a credential."),
            ("§37.3", "Records", "Keep records."),
            ("§37.4", "Fees", "Fees apply."),
        ]);
        let edges = vec![Edge::explicit("§37.1", "§37.3", 1), Edge::explicit("§37.4", "§37.3", 1)];
        let inputs = SalienceInputs {
            explicit_edges: &edges,
            ..no_inputs(&lexicon)
        };
        let waypoints = WaypointScorer::default().score(&sections, inputs).unwrap();
        let ranked: Vec<_> = waypoints.iter().map(|w| (w.sec_id.as_str(), w.score)).collect();
        // §37.2: lexicon 0.25 + heading 0.05; §37.3: centrality 0.20; §37.1: heading 0.5 * 0.05
        assert_eq!(
            ranked,
            vec![("§37.2", 0.3), ("§37.3", 0.2), ("§37.1", 0.025), ("§37.4", 0.0)]
        );
    }

    #[test]
    fn k_limits_and_ties_keep_document_order() {
        let lexicon = Lexicon::default();
        let sections = set(&[
            ("§2.1", "A", "x"),
            ("§2.2", "B", "y"),
            ("§2.3", "C", "z"),
        ]);
        let scorer = WaypointScorer::new(WaypointConfig {
            k: 2,
            ..WaypointConfig::default()
        });
        let waypoints = scorer.score(&sections, no_inputs(&lexicon)).unwrap();
        let ids: Vec<_> = waypoints.iter().map(|w| w.sec_id.as_str()).collect();
        assert_eq!(ids, vec!["§2.1", "§2.2"]);
    }

    #[test]
    fn term_and_xref_signals_use_upstream_records() {
        let lexicon = Lexicon::default();
        let sections = set(&[("§3.1", "A", "x"), ("§3.2", "B", "y")]);
        let terms = vec![TermRecord {
            sec_id: "§ 3.2".into(),
            heading: "B".into(),
            term_density: 0.5,
            tfidf_sum: 1.7,
            top_terms: Vec::new(),
        }];
        let refs = vec![Reference {
            doc_id: "doc".into(),
            sec_id: "§3.1".into(),
            heading: "A".into(),
            explicit_refs: vec!["20CFR §404.1".into(), "§3.2".into()],
            spans: Vec::new(),
        }];
        let inputs = SalienceInputs {
            terms: &terms,
            references: &refs,
            ..no_inputs(&lexicon)
        };
        let waypoints = WaypointScorer::default().score(&sections, inputs).unwrap();
        let ranked: Vec<_> = waypoints.iter().map(|w| (w.sec_id.as_str(), w.score)).collect();
        assert_eq!(ranked, vec![("§3.2", 0.45), ("§3.1", 0.05)]);
    }

    #[test]
    fn empty_document_has_no_waypoints() {
        let lexicon = Lexicon::default();
        let waypoints = WaypointScorer::default()
            .score(&SectionSet::default(), no_inputs(&lexicon))
            .unwrap();
        assert!(waypoints.is_empty());
    }

    #[test]
    fn scoring_is_deterministic() {
        let lexicon = Lexicon {
            global_terms: vec!["records".into()],
            ..Lexicon::default()
        };
        let sections = set(&[
            ("§4.1", "Purpose", "Records matter."),
            ("§4.2", "Records", "Keep records for years."),
            ("§4.3", "Applicability", "Applies to records."),
        ]);
        let scorer = WaypointScorer::default();
        let a = scorer.score(&sections, no_inputs(&lexicon)).unwrap();
        let b = scorer.score(&sections, no_inputs(&lexicon)).unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn negative_weights_rejected() {
        let config = WaypointConfig {
            weights: SignalWeights {
                xref: -0.1,
                ..SignalWeights::default()
            },
            ..WaypointConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
