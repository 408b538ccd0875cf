use crate::error::Result;
use crate::gists::Gist;
use crate::stitch::StitchedItem;
use docustitch_sections::{normalize_sec_id, repair_mojibake, SectionSet};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Stitched entries included in a refinement context
pub const MAX_CONTEXT_ITEMS: usize = 18;

/// Longest tail dropped to end a capped text on a sentence boundary
const SENTENCE_SNAP_CHARS: usize = 40;

static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static SPACE_BEFORE_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\n").expect("valid regex"));
static SPACE_AFTER_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s+").expect("valid regex"));
static PAREN_SECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*§\s*").expect("valid regex"));
static SPACE_BEFORE_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\)").expect("valid regex"));

/// Input handed to a refinement backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefineRequest {
    pub doc_id: String,

    /// Extractive draft to rewrite
    pub draft: String,

    /// Anchor headings and gists in stitched order
    pub context: String,

    pub budget_words: usize,
}

/// A rewriting backend: draft plus budget in, refined text out
pub trait Refiner: Send + Sync {
    fn name(&self) -> &'static str;

    fn refine(&self, request: &RefineRequest) -> Result<String>;
}

/// Typography cleanup only; no rewriting
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughRefiner;

impl Refiner for PassthroughRefiner {
    fn name(&self) -> &'static str {
        "none"
    }

    fn refine(&self, request: &RefineRequest) -> Result<String> {
        Ok(normalize_section_parens(&normalize_typography(&request.draft)))
    }
}

/// Run `refiner` and enforce the word budget on whatever it returns
pub fn refine_draft(refiner: &dyn Refiner, request: &RefineRequest) -> Result<String> {
    let refined = refiner.refine(request)?;
    let capped = hard_word_cap(&refined, request.budget_words);
    log::info!(
        "Refined {} with '{}' backend: {} -> {} words (budget {})",
        request.doc_id,
        refiner.name(),
        request.draft.split_whitespace().count(),
        capped.split_whitespace().count(),
        request.budget_words
    );
    Ok(capped)
}

fn normalize_typography(text: &str) -> String {
    let text = repair_mojibake(text);
    let text = INLINE_SPACE.replace_all(&text, " ");
    let text = SPACE_BEFORE_NEWLINE.replace_all(&text, "\n");
    let text = SPACE_AFTER_NEWLINE.replace_all(&text, "\n");
    text.trim().to_string()
}

fn normalize_section_parens(text: &str) -> String {
    let text = PAREN_SECTION.replace_all(text, "(§");
    SPACE_BEFORE_PAREN.replace_all(&text, ")").into_owned()
}

/// Truncate to `budget` words, then snap back to the last sentence
/// terminator when that drops at most 40 characters. Text within budget is
/// returned unchanged.
pub fn hard_word_cap(text: &str, budget: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= budget {
        return text.to_string();
    }
    let clipped = words[..budget].join(" ");
    match clipped.rfind(|c: char| matches!(c, '.' | '!' | '?')) {
        Some(end) if end > 0 && clipped[end + 1..].chars().count() <= SENTENCE_SNAP_CHARS => {
            clipped[..=end].to_string()
        }
        _ => clipped,
    }
}

/// Compact context from the stitched order: entries of part `part` only
/// (at most [`MAX_CONTEXT_ITEMS`]), each `"<id> — <heading>"` followed by the
/// anchor's gist when one exists.
pub fn build_refine_context(
    part: u32,
    stitched: &[StitchedItem],
    sections: &SectionSet,
    gists: &[Gist],
) -> String {
    let prefix = format!("§{part}.");
    let gist_text: HashMap<String, &str> = gists
        .iter()
        .map(|g| (normalize_sec_id(&g.anchor_sec_id), g.gist_text.as_str()))
        .collect();

    let entries: Vec<String> = stitched
        .iter()
        .map(|item| normalize_sec_id(&item.sec_id))
        .filter(|sid| sid.starts_with(&prefix))
        .take(MAX_CONTEXT_ITEMS)
        .map(|sid| {
            let heading = sections
                .get(&sid)
                .map(|s| normalize_typography(&s.heading))
                .unwrap_or_default();
            let mut chunk = if heading.is_empty() {
                sid.clone()
            } else {
                format!("{sid} — {heading}")
            };
            if let Some(gist) = gist_text.get(&sid).filter(|g| !g.trim().is_empty()) {
                chunk.push('\n');
                chunk.push_str(&normalize_typography(gist));
            }
            chunk
        })
        .collect();

    entries.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stitch::Role;
    use docustitch_sections::Section;
    use pretty_assertions::assert_eq;

    fn request(draft: &str, budget_words: usize) -> RefineRequest {
        RefineRequest {
            doc_id: "cfr_6_37".into(),
            draft: draft.into(),
            context: String::new(),
            budget_words,
        }
    }

    #[test]
    fn word_cap_snaps_to_sentence_end() {
        let text = "One two three. Four five six seven";
        assert_eq!(hard_word_cap(text, 5), "One two three.");
        assert_eq!(hard_word_cap(text, 10), text);
        assert_eq!(hard_word_cap("alpha beta gamma", 2), "alpha beta");
        assert_eq!(hard_word_cap("anything at all", 0), "");
    }

    #[test]
    fn word_cap_keeps_long_tails() {
        let tail = "word ".repeat(12);
        let text = format!("Start. {tail}end");
        let capped = hard_word_cap(&text, 12);
        assert_eq!(capped.split_whitespace().count(), 12);
        assert!(!capped.ends_with('.'));
    }

    #[test]
    fn passthrough_cleans_typography() {
        let draft = "Â§37.3 applies  (  § 37.5 ).\n   Next   line \nend";
        let refined = PassthroughRefiner.refine(&request(draft, 100)).unwrap();
        assert_eq!(refined, "§37.3 applies (§37.5).\nNext line\nend");
    }

    #[test]
    fn refine_draft_enforces_budget() {
        let out = refine_draft(&PassthroughRefiner, &request("A b c. D e f g h", 4)).unwrap();
        assert_eq!(out, "A b c.");
    }

    #[test]
    fn context_is_limited_to_the_part() {
        let sections = SectionSet::new(
            "doc",
            vec![
                Section::new("doc", "§37.1", "Scope", "x"),
                Section::new("doc", "§37.2", "", "y"),
            ],
        );
        let stitched: Vec<StitchedItem> = ["§37.1", "§115.4", "§37.2"]
            .iter()
            .map(|id| StitchedItem {
                sec_id: (*id).into(),
                role: Role::Anchor,
            })
            .collect();
        let gists = vec![Gist {
            anchor_sec_id: "§37.1".into(),
            window_size: 1,
            k_sentences: 6,
            lambda: 0.7,
            gist_text: "Covers  States.".into(),
            token_estimate: 2,
            source_spans: Vec::new(),
        }];
        assert_eq!(
            build_refine_context(37, &stitched, &sections, &gists),
            "§37.1 — Scope\nCovers States.\n\n§37.2"
        );
    }
}
