use crate::enrich::CitationEnricher;
use crate::patterns::PatternKind;
use docustitch_sections::{normalize_sec_id, Section, SectionSet};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Widest `§§A–B` range that is expanded into individual ids
pub const MAX_RANGE_SPAN: u32 = 500;

static LEADING_MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[§\s]+").expect("valid regex"));

/// Audit classification of a citation span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Local,
    Range,
    Crossdoc,
}

/// Where a citation occurs in the section text (byte offsets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationSpan {
    /// Matched text as written
    pub ref_text: String,

    /// Normalized citation (`§37.3`, `§§37.3–37.9`, `20CFR §408.210`)
    pub raw_id: String,

    pub start: usize,
    pub end: usize,
    pub kind: SpanKind,

    /// In-document section ids this span points at (empty for cross-document spans)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

/// Citations found in one section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub doc_id: String,

    pub sec_id: String,

    #[serde(default)]
    pub heading: String,

    /// Sorted, deduplicated normalized tokens
    #[serde(default)]
    pub explicit_refs: Vec<String>,

    #[serde(default, alias = "explicit_ref_spans")]
    pub spans: Vec<CitationSpan>,
}

impl Reference {
    /// Tokens shaped like in-document citations
    pub fn local_refs(&self) -> impl Iterator<Item = &str> {
        self.explicit_refs
            .iter()
            .map(String::as_str)
            .filter(|token| docustitch_sections::is_local_section_token(token))
    }
}

/// Expand `A–B` into the inclusive id sequence when both share a part and
/// the width is at most [`MAX_RANGE_SPAN`]; otherwise return the endpoints.
#[must_use]
pub fn expand_range(a: &str, b: &str) -> Vec<String> {
    let parsed = a.split_once('.').zip(b.split_once('.'));
    if let Some(((a_part, a_sec), (b_part, b_sec))) = parsed {
        if a_part == b_part {
            if let (Ok(lo), Ok(hi)) = (a_sec.parse::<u32>(), b_sec.parse::<u32>()) {
                if lo <= hi && hi - lo <= MAX_RANGE_SPAN {
                    return (lo..=hi).map(|n| format!("{a_part}.{n}")).collect();
                }
            }
        }
    }
    vec![a.to_string(), b.to_string()]
}

fn local_id(raw: &str) -> String {
    let stripped = LEADING_MARKERS.replace(raw, "");
    format!("§{}", stripped.replace(' ', ""))
}

fn group<'t>(caps: &Captures<'t>, idx: usize) -> &'t str {
    caps.get(idx).map_or("", |m| m.as_str())
}

/// Normalized citation tokens of `text`, sorted and deduplicated
#[must_use]
pub fn citation_tokens(text: &str) -> Vec<String> {
    let mut hits = BTreeSet::new();
    for kind in PatternKind::PRIORITY {
        for caps in kind.regex().captures_iter(text) {
            match kind {
                PatternKind::Range => {
                    for id in expand_range(group(&caps, 1), group(&caps, 2)) {
                        hits.insert(format!("§{id}"));
                    }
                }
                PatternKind::Local => {
                    hits.insert(local_id(group(&caps, 0)));
                }
                PatternKind::InWord => {
                    hits.insert(format!("§{}", group(&caps, 1)));
                }
                PatternKind::CrossDocSection => {
                    hits.insert(format!("{}CFR §{}", group(&caps, 1), group(&caps, 2)));
                }
                PatternKind::CrossDocPart => {
                    hits.insert(format!("{}CFR part {}", group(&caps, 1), group(&caps, 2)));
                }
            }
        }
    }
    hits.into_iter().collect()
}

/// Typed citation spans of `text`, sorted by `(start, end)`.
///
/// Identical `(start, end, text)` matches from different pattern families are
/// reported once, by the family with the higher priority.
#[must_use]
pub fn find_spans(text: &str) -> Vec<CitationSpan> {
    let mut spans = Vec::new();
    let mut seen: HashSet<(usize, usize, String)> = HashSet::new();

    for kind in PatternKind::PRIORITY {
        for caps in kind.regex().captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let key = (whole.start(), whole.end(), whole.as_str().to_string());
            if !seen.insert(key) {
                continue;
            }

            let (raw_id, span_kind, targets) = match kind {
                PatternKind::Range => {
                    let (a, b) = (group(&caps, 1), group(&caps, 2));
                    let targets = expand_range(a, b)
                        .into_iter()
                        .map(|id| format!("§{id}"))
                        .collect();
                    (format!("§§{a}–{b}"), SpanKind::Range, targets)
                }
                PatternKind::Local => {
                    let id = local_id(whole.as_str());
                    (id.clone(), SpanKind::Local, vec![id])
                }
                PatternKind::InWord => {
                    let id = format!("§{}", group(&caps, 1));
                    (id.clone(), SpanKind::Local, vec![id])
                }
                PatternKind::CrossDocSection => (
                    format!("{}CFR §{}", group(&caps, 1), group(&caps, 2)),
                    SpanKind::Crossdoc,
                    Vec::new(),
                ),
                PatternKind::CrossDocPart => (
                    format!("{}CFR part {}", group(&caps, 1), group(&caps, 2)),
                    SpanKind::Crossdoc,
                    Vec::new(),
                ),
            };

            spans.push(CitationSpan {
                ref_text: whole.as_str().to_string(),
                raw_id,
                start: whole.start(),
                end: whole.end(),
                kind: span_kind,
                targets,
            });
        }
    }

    spans.sort_by_key(|span| (span.start, span.end));
    spans
}

/// Reference extractor with optional additive enrichers
pub struct ReferenceExtractor {
    enrichers: Vec<Box<dyn CitationEnricher>>,
}

impl ReferenceExtractor {
    /// Base patterns only
    #[must_use]
    pub fn new() -> Self {
        Self {
            enrichers: Vec::new(),
        }
    }

    /// Add an enricher; its tokens are unioned with the base tokens
    #[must_use]
    pub fn with_enricher(mut self, enricher: impl CitationEnricher + 'static) -> Self {
        self.enrichers.push(Box::new(enricher));
        self
    }

    /// Extract citations from a single section
    #[must_use]
    pub fn extract(&self, section: &Section) -> Reference {
        let text = section.text.as_str();
        let mut tokens: BTreeSet<String> = citation_tokens(text).into_iter().collect();

        for enricher in &self.enrichers {
            let before = tokens.len();
            tokens.extend(enricher.enrich(text));
            let added = tokens.len() - before;
            if added > 0 {
                log::debug!(
                    "{} added {} token(s) to {}",
                    enricher.name(),
                    added,
                    section.sec_id
                );
            }
        }

        Reference {
            doc_id: section.doc_id.clone(),
            sec_id: normalize_sec_id(&section.sec_id),
            heading: section.heading.clone(),
            explicit_refs: tokens.into_iter().collect(),
            spans: find_spans(text),
        }
    }

    /// Extract citations from every section, in document order
    #[must_use]
    pub fn extract_all(&self, sections: &SectionSet) -> Vec<Reference> {
        let refs: Vec<Reference> = sections.iter().map(|s| self.extract(s)).collect();
        log::info!(
            "Extracted references: {} sections, {} tokens",
            refs.len(),
            refs.iter().map(|r| r.explicit_refs.len()).sum::<usize>()
        );
        refs
    }
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::CfrCitationParser;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn extracts_all_citation_shapes() {
        let text = "Under §§ 37.3–37.5 and § 37.10(b), see also section 37.41. \
                    Compare 20 CFR § 408.210 and 6 CFR part 115.";
        let tokens = citation_tokens(text);
        assert_eq!(
            tokens,
            vec![
                "20CFR §408.210",
                "6CFR part 115",
                "§37.10(b)",
                "§37.3",
                "§37.4",
                "§37.41",
                "§37.5",
                "§408.210",
            ]
        );
    }

    #[test]
    fn spans_are_typed_and_ordered() {
        let text = "See §§37.3-37.4 and 6 CFR part 37.";
        let spans = find_spans(text);
        let kinds: Vec<_> = spans.iter().map(|s| (s.raw_id.as_str(), s.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("§37.3-37", SpanKind::Local),
                ("§§37.3–37.4", SpanKind::Range),
                ("6CFR part 37", SpanKind::Crossdoc),
            ]
        );
        let range = &spans[1];
        assert_eq!(range.targets, vec!["§37.3", "§37.4"]);
        assert_eq!(&text[range.start..range.end], "§§37.3-37.4");
        assert_eq!(spans[0].start, range.start);
        assert!(spans[2].targets.is_empty());
    }

    #[test]
    fn wide_or_cross_part_ranges_keep_endpoints() {
        assert_eq!(expand_range("37.1", "37.3"), vec!["37.1", "37.2", "37.3"]);
        assert_eq!(expand_range("37.1", "38.3"), vec!["37.1", "38.3"]);
        assert_eq!(expand_range("37.1", "37.999"), vec!["37.1", "37.999"]);
        assert_eq!(expand_range("37.9", "37.2"), vec!["37.9", "37.2"]);
    }

    #[test]
    fn malformed_tokens_are_dropped() {
        assert!(citation_tokens("§ abc and section four and CFR part").is_empty());
        assert!(find_spans("").is_empty());
    }

    #[test]
    fn enrichment_only_adds_tokens() {
        let section = Section::new(
            "cfr_6_37",
            "§37.1",
            "Scope",
            "As required by 6 C.F.R. 37.5 and §37.3.",
        );
        let base = ReferenceExtractor::new().extract(&section);
        let enriched = ReferenceExtractor::new()
            .with_enricher(CfrCitationParser::new())
            .extract(&section);

        for token in &base.explicit_refs {
            assert!(enriched.explicit_refs.contains(token));
        }
        assert_eq!(base.explicit_refs, vec!["§37.3"]);
        assert_eq!(enriched.explicit_refs, vec!["6CFR §37.5", "§37.3"]);
    }

    proptest! {
        #[test]
        fn range_expansion_respects_bound(part in 1u32..999, lo in 0u32..999, width in 0u32..1200) {
            let hi = lo + width;
            let a = format!("{part}.{lo}");
            let b = format!("{part}.{hi}");
            let ids = expand_range(&a, &b);
            if width <= MAX_RANGE_SPAN {
                prop_assert_eq!(ids.len() as u32, width + 1);
            } else {
                prop_assert_eq!(ids, vec![a, b]);
            }
        }

        #[test]
        fn ranges_across_parts_are_never_expanded(a_part in 1u32..500, b_part in 500u32..999, lo in 0u32..50, hi in 50u32..100) {
            let a = format!("{a_part}.{lo}");
            let b = format!("{b_part}.{hi}");
            prop_assert_eq!(expand_range(&a, &b), vec![a, b]);
        }
    }
}
