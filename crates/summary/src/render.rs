use crate::error::{Result, SummaryError};
use crate::gists::Gist;
use crate::stitch::StitchedItem;
use docustitch_sections::{normalize_sec_id, split_sentences, word_count, SectionSet};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

const FALLBACK_SENTENCES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Word budget for the draft
    pub budget: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { budget: 1200 }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.budget == 0 {
            return Err(SummaryError::invalid_config("render.budget must be positive"));
        }
        Ok(())
    }
}

/// Where a block's text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSource {
    Gist,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedBlock {
    pub sec_id: String,
    pub heading: String,
    pub text: String,
    pub tokens: usize,
    pub source: BlockSource,
}

/// Rendered draft; `tokens_used <= budget` always holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub blocks: Vec<RenderedBlock>,
    pub tokens_used: usize,
    pub budget: usize,
}

impl Summary {
    /// Plain-text draft with a trailing usage line
    pub fn to_text(&self) -> String {
        let mut out = String::from("# Stitched Summary\n\n");
        for block in &self.blocks {
            let _ = writeln!(out, "{} — {}\n{}\n", block.sec_id, block.heading, block.text);
        }
        let _ = writeln!(
            out,
            "\n---\nApprox tokens used: {} / {}",
            self.tokens_used, self.budget
        );
        out
    }
}

/// Greedy budget packing over the stitched order.
///
/// A block that would overflow the budget is skipped and the walk continues,
/// so later shorter blocks can still fit.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn render(&self, sections: &SectionSet, gists: &[Gist], stitched: &[StitchedItem]) -> Summary {
        let gist_text: HashMap<String, &str> = gists
            .iter()
            .map(|g| (normalize_sec_id(&g.anchor_sec_id), g.gist_text.as_str()))
            .collect();

        let budget = self.config.budget;
        let mut summary = Summary {
            budget,
            ..Summary::default()
        };
        let mut used: HashSet<String> = HashSet::new();
        let mut skipped = 0usize;

        for item in stitched {
            let sec_id = normalize_sec_id(&item.sec_id);
            if !used.insert(sec_id.clone()) {
                continue;
            }
            let section = sections.get(&sec_id);
            let heading = section.map(|s| s.heading.clone()).unwrap_or_default();

            let (text, source) = match gist_text.get(&sec_id) {
                Some(text) if !text.trim().is_empty() => (text.trim().to_string(), BlockSource::Gist),
                _ => (
                    section.map(|s| fallback_text(&s.text)).unwrap_or_default(),
                    BlockSource::Fallback,
                ),
            };
            if text.is_empty() {
                log::debug!("No text for {sec_id}; skipping block");
                continue;
            }

            let tokens = word_count(&text);
            if summary.tokens_used + tokens > budget {
                log::debug!(
                    "Skipping {sec_id} ({tokens} words) at {}/{budget}",
                    summary.tokens_used
                );
                skipped += 1;
                continue;
            }
            summary.tokens_used += tokens;
            summary.blocks.push(RenderedBlock {
                sec_id,
                heading,
                text,
                tokens,
                source,
            });
        }

        log::info!(
            "Rendered {} blocks, {} / {} words ({} skipped over budget)",
            summary.blocks.len(),
            summary.tokens_used,
            budget,
            skipped
        );
        summary
    }
}

/// First two sentences of a section, or its trimmed text when none split out
pub fn fallback_text(text: &str) -> String {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return text.trim().to_string();
    }
    sentences
        .into_iter()
        .take(FALLBACK_SENTENCES)
        .collect::<Vec<_>>()
        .join(" ")
}
