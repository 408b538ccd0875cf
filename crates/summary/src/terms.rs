use crate::error::{Result, SummaryError};
use crate::tfidf::{TfidfConfig, TfidfSpace};
use docustitch_sections::{repair_mojibake, SectionSet};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

static TERM_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[^\W\d_][\w\-']+\b").expect("valid term token regex"));
static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w§.\-/'() ]+").expect("valid character filter regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// English function words plus legal boilerplate
pub const DOMAIN_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "for", "on", "by", "with", "as", "at", "from",
    "that", "this", "these", "those", "is", "are", "was", "were", "be", "being", "been", "it",
    "its", "shall", "must", "may", "should", "can", "will", "not", "no", "any", "all", "each",
    "such", "section", "sections", "subsection", "subsections", "paragraph", "paragraphs",
    "subpart", "subparts", "part", "parts", "title", "chapter", "cfr", "usc", "code",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermConfig {
    /// Terms reported per section
    pub top_k: usize,
    pub min_df: usize,
    pub max_df: f64,
    pub max_features: usize,
}

impl Default for TermConfig {
    fn default() -> Self {
        Self {
            top_k: 25,
            min_df: 2,
            max_df: 0.98,
            max_features: 20_000,
        }
    }
}

impl TermConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(SummaryError::invalid_config(format!(
                "terms.max_df must be within (0, 1], got {}",
                self.max_df
            )));
        }
        if self.max_features == 0 {
            return Err(SummaryError::invalid_config("terms.max_features must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermScore {
    pub term: String,
    pub score: f64,
}

/// Keyword profile of one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermRecord {
    pub sec_id: String,
    #[serde(default)]
    pub heading: String,

    /// Non-zero features per whitespace word
    pub term_density: f64,

    /// Sum of the reported top-term weights
    #[serde(default)]
    pub tfidf_sum: f64,

    #[serde(default)]
    pub top_terms: Vec<TermScore>,
}

fn clean_for_terms(text: &str) -> String {
    let text = repair_mojibake(&text.replace('\r', " "));
    let text = UNSAFE_CHARS.replace_all(&text, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

pub(crate) fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Per-section TF-IDF keywords over 1–3-grams
#[derive(Debug, Clone, Default)]
pub struct TermExtractor {
    config: TermConfig,
}

impl TermExtractor {
    pub fn new(config: TermConfig) -> Self {
        Self { config }
    }

    fn vectorizer(&self) -> TfidfConfig {
        TfidfConfig {
            ngram_range: (1, 3),
            min_df: self.config.min_df,
            max_df: self.config.max_df,
            max_features: Some(self.config.max_features),
            sublinear_tf: true,
            stop_words: DOMAIN_STOP_WORDS.iter().map(|w| (*w).to_string()).collect(),
            token_pattern: Regex::clone(&TERM_TOKEN),
        }
    }

    pub fn extract(&self, sections: &SectionSet) -> Vec<TermRecord> {
        let texts: Vec<String> = sections
            .iter()
            .map(|s| format!("{} {}", clean_for_terms(&s.heading), clean_for_terms(&s.text)))
            .collect();
        let documents: Vec<&str> = texts.iter().map(String::as_str).collect();
        let (space, vectors) = TfidfSpace::fit_transform(self.vectorizer(), &documents);

        let records: Vec<TermRecord> = sections
            .iter()
            .zip(texts.iter().zip(&vectors))
            .map(|(section, (text, vector))| {
                let words = text.split_whitespace().count().max(1);

                let mut ranked: Vec<(usize, f64)> = vector.entries().to_vec();
                ranked.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| a.0.cmp(&b.0))
                });
                ranked.truncate(self.config.top_k);

                let mut tfidf_sum = 0.0;
                let top_terms: Vec<TermScore> = ranked
                    .into_iter()
                    .filter_map(|(idx, weight)| {
                        let term = space.term(idx)?;
                        if term.chars().count() < 2 {
                            return None;
                        }
                        tfidf_sum += weight;
                        Some(TermScore {
                            term: term.to_string(),
                            score: round6(weight),
                        })
                    })
                    .collect();

                TermRecord {
                    sec_id: section.sec_id.clone(),
                    heading: section.heading.clone(),
                    term_density: vector.nnz() as f64 / words as f64,
                    tfidf_sum: round6(tfidf_sum),
                    top_terms,
                }
            })
            .collect();

        log::info!(
            "Extracted terms for {} sections ({} features)",
            records.len(),
            space.len()
        );
        records
    }
}
