use crate::extractor::{Reference, SpanKind};
use docustitch_graph::Edge;
use docustitch_sections::{is_local_section_token, normalize_sec_id, SectionSet};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

static CLAUSE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\([a-z0-9]+\))+$").expect("valid clause suffix regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeOptions {
    /// Retry unmatched tokens without trailing paragraph designators
    /// (`§37.10(b)(2)` → `§37.10`). Off: only exact ids resolve.
    pub strip_clauses: bool,
}

/// Resolve a local citation token to a section id of the document
fn resolve(token: &str, sections: &SectionSet, options: EdgeOptions) -> Option<String> {
    let token = normalize_sec_id(token);
    if !is_local_section_token(&token) {
        return None;
    }
    if sections.contains(&token) {
        return Some(token);
    }
    if !options.strip_clauses {
        return None;
    }
    let base = CLAUSE_SUFFIX.replace(&token, "");
    sections.contains(&base).then(|| base.into_owned())
}

/// One explicit edge per distinct in-document `(src, dst)` citation, matching
/// tokens to section ids exactly.
///
/// Cross-document tokens, self references and targets outside the document
/// are dropped. `span_count` is the number of distinct local or range spans
/// in the source that resolve to the destination (at least 1).
pub fn build_explicit_edges(sections: &SectionSet, refs: &[Reference]) -> Vec<Edge> {
    build_explicit_edges_with(sections, refs, EdgeOptions::default())
}

pub fn build_explicit_edges_with(
    sections: &SectionSet,
    refs: &[Reference],
    options: EdgeOptions,
) -> Vec<Edge> {
    let mut edges = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for reference in refs {
        let src = normalize_sec_id(&reference.sec_id);
        if !sections.contains(&src) {
            log::debug!("Skipping references of unknown section {src}");
            continue;
        }

        let mut span_counts: HashMap<String, u32> = HashMap::new();
        for span in &reference.spans {
            if span.kind == SpanKind::Crossdoc {
                continue;
            }
            let resolved: HashSet<String> = span
                .targets
                .iter()
                .filter_map(|t| resolve(t, sections, options))
                .collect();
            for dst in resolved {
                *span_counts.entry(dst).or_default() += 1;
            }
        }

        for token in &reference.explicit_refs {
            let Some(dst) = resolve(token, sections, options) else {
                continue;
            };
            if dst == src || !seen.insert((src.clone(), dst.clone())) {
                continue;
            }
            let span_count = span_counts.get(&dst).copied().unwrap_or(1);
            edges.push(Edge::explicit(src.clone(), dst, span_count));
        }
    }

    log::info!("Built {} explicit edges from {} references", edges.len(), refs.len());
    edges
}
