use crate::error::{Result, SummaryError};
use crate::mmr;
use crate::tfidf::{TfidfConfig, TfidfSpace};
use crate::waypoints::Waypoint;
use docustitch_sections::{normalize_sec_id, split_sentences, word_count, SectionSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GistConfig {
    /// Sentences selected per anchor
    pub k_sentences: usize,

    /// Relevance/diversity trade-off in `[0, 1]`
    pub lambda: f64,
}

impl Default for GistConfig {
    fn default() -> Self {
        Self {
            k_sentences: 6,
            lambda: 0.7,
        }
    }
}

impl GistConfig {
    pub fn validate(&self) -> Result<()> {
        if self.k_sentences == 0 {
            return Err(SummaryError::invalid_config("gists.k_sentences must be positive"));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(SummaryError::invalid_config(format!(
                "gists.lambda must be within [0, 1], got {}",
                self.lambda
            )));
        }
        Ok(())
    }
}

/// Provenance of one selected sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub sec_id: String,
    pub sent_idx: usize,
    pub sent_text: String,
}

/// Extractive sentence bundle for one waypoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gist {
    pub anchor_sec_id: String,
    pub window_size: usize,
    pub k_sentences: usize,
    pub lambda: f64,
    pub gist_text: String,
    pub token_estimate: usize,
    pub source_spans: Vec<SourceSpan>,
}

struct Candidate {
    position: usize,
    span: SourceSpan,
}

/// Builds one gist per waypoint from the sentences of its `±window` block
#[derive(Debug, Clone, Default)]
pub struct GistBuilder {
    config: GistConfig,
}

impl GistBuilder {
    pub fn new(config: GistConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, sections: &SectionSet, waypoints: &[Waypoint]) -> Vec<Gist> {
        let gists: Vec<Gist> = waypoints
            .iter()
            .filter_map(|wp| self.build_one(sections, &wp.sec_id, wp.window))
            .collect();
        log::info!(
            "Built {} gists for {} waypoints",
            gists.len(),
            waypoints.len()
        );
        gists
    }

    /// Gist for one anchor; `None` when the anchor is unknown or its block has no sentences
    pub fn build_one(&self, sections: &SectionSet, anchor: &str, window: usize) -> Option<Gist> {
        let anchor = normalize_sec_id(anchor);
        let Some(anchor_pos) = sections.position(&anchor) else {
            log::debug!("Waypoint {anchor} is not a section of this document");
            return None;
        };
        let lo = anchor_pos.saturating_sub(window);
        let block = sections.window(anchor_pos, window);

        let candidates: Vec<Candidate> = block
            .iter()
            .enumerate()
            .flat_map(|(offset, section)| {
                split_sentences(&section.text)
                    .into_iter()
                    .enumerate()
                    .map(move |(sent_idx, sent_text)| Candidate {
                        position: lo + offset,
                        span: SourceSpan {
                            sec_id: section.sec_id.clone(),
                            sent_idx,
                            sent_text,
                        },
                    })
            })
            .collect();
        if candidates.is_empty() {
            log::debug!("No sentences around {anchor}; skipping gist");
            return None;
        }

        let vectorizer = TfidfConfig {
            ngram_range: (1, 2),
            max_df: 0.9,
            ..TfidfConfig::default()
        };
        let texts: Vec<&str> = candidates.iter().map(|c| c.span.sent_text.as_str()).collect();
        let (space, vectors) = TfidfSpace::fit_transform(vectorizer, &texts);

        let anchor_heading = &sections.sections()[anchor_pos].heading;
        let block_headings: Vec<&str> = block.iter().map(|s| s.heading.as_str()).collect();
        let query = space.transform(&format!("{} {}", anchor_heading, block_headings.join(" ")));

        let mut picks =
            mmr::select_vectors(&query, &vectors, self.config.lambda, self.config.k_sentences);
        picks.sort_by_key(|&i| (candidates[i].position, candidates[i].span.sent_idx));

        let source_spans: Vec<SourceSpan> = picks.iter().map(|&i| candidates[i].span.clone()).collect();
        let gist_text = source_spans
            .iter()
            .map(|s| s.sent_text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Some(Gist {
            anchor_sec_id: anchor,
            window_size: window,
            k_sentences: self.config.k_sentences,
            lambda: self.config.lambda,
            token_estimate: word_count(&gist_text),
            gist_text,
            source_spans,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waypoints::WAYPOINT_REASON;
    use docustitch_sections::Section;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn document() -> SectionSet {
        let rows = [
            ("§37.1", "Scope", "This part sets standards for driver licenses. It applies to every State."),
            ("§37.2", "Definitions", "Card means an identification card. License means a driver license issued by a State."),
            ("§37.3", "Verification", "A State must verify identity documents. Verification happens before issuance. Records of verification are kept."),
            ("§37.4", "Fees", "States may charge reasonable fees for each card."),
            ("§37.5", "Reserved", "Reserved."),
        ];
        SectionSet::new(
            "doc",
            rows.iter()
                .map(|(id, h, t)| Section::new("doc", id, *h, *t))
                .collect(),
        )
    }

    fn waypoint(id: &str, window: usize) -> Waypoint {
        Waypoint {
            sec_id: id.into(),
            score: 1.0,
            window,
            reason: WAYPOINT_REASON.into(),
        }
    }

    #[test]
    fn gist_restores_document_order() {
        let builder = GistBuilder::new(GistConfig {
            k_sentences: 3,
            lambda: 0.7,
        });
        let gist = builder.build_one(&document(), "§37.2", 1).unwrap();
        assert_eq!(gist.anchor_sec_id, "§37.2");
        assert_eq!(gist.source_spans.len(), 3);
        let order: Vec<_> = gist
            .source_spans
            .iter()
            .map(|s| (document().position(&s.sec_id).unwrap(), s.sent_idx))
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert_eq!(gist.token_estimate, word_count(&gist.gist_text));
        assert!(gist.source_spans.iter().all(|s| gist.gist_text.contains(&s.sent_text)));
    }

    #[test]
    fn first_pick_matches_the_headings() {
        let builder = GistBuilder::new(GistConfig {
            k_sentences: 1,
            lambda: 0.7,
        });
        let gist = builder.build_one(&document(), "§37.3", 0).unwrap();
        // shortest sentence sharing the heading term carries the most weight on it
        assert_eq!(gist.source_spans[0].sent_text, "Verification happens before issuance.");
    }

    #[test]
    fn window_without_sentences_is_skipped() {
        let builder = GistBuilder::default();
        assert!(builder.build_one(&document(), "§37.5", 0).is_none());
        assert!(builder.build_one(&document(), "§99.1", 1).is_none());

        let gists = builder.build(&document(), &[waypoint("§37.5", 0), waypoint("§37.1", 1)]);
        assert_eq!(gists.len(), 1);
        assert_eq!(gists[0].anchor_sec_id, "§37.1");
    }

    #[test]
    fn unbounded_window_covers_the_whole_document() {
        let gist = GistBuilder::default()
            .build_one(&document(), "§37.2", usize::MAX)
            .unwrap();
        assert_eq!(gist.window_size, usize::MAX);
        assert!(!gist.source_spans.is_empty());
        assert!(gist
            .source_spans
            .iter()
            .all(|s| document().position(&s.sec_id).is_some()));
    }

    #[test]
    fn config_validation() {
        assert!(GistConfig::default().validate().is_ok());
        assert!(GistConfig { k_sentences: 0, lambda: 0.7 }.validate().is_err());
        assert!(GistConfig { k_sentences: 2, lambda: 1.5 }.validate().is_err());
    }

    proptest! {
        #[test]
        fn spans_stay_within_window_and_bound(
            anchor in 0usize..5,
            window in 0usize..3,
            k in 1usize..8,
        ) {
            let doc = document();
            let builder = GistBuilder::new(GistConfig { k_sentences: k, lambda: 0.7 });
            let anchor_id = doc.sections()[anchor].sec_id.clone();
            if let Some(gist) = builder.build_one(&doc, &anchor_id, window) {
                prop_assert!(gist.source_spans.len() <= k);
                for span in &gist.source_spans {
                    let pos = doc.position(&span.sec_id).unwrap();
                    prop_assert!(pos.abs_diff(anchor) <= window);
                }
            }
        }
    }
}
