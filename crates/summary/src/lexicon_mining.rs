use crate::error::{Result, SummaryError};
use crate::terms::TermRecord;
use docustitch_sections::{repair_mojibake, Lexicon};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static PUNCT_EDGES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\w§]+|[^\w)]+$").expect("valid edge punctuation regex"));

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in", "into",
    "is", "it", "its", "of", "on", "or", "that", "the", "their", "there", "these", "this", "to",
    "under", "with", "without", "such", "shall", "may", "can", "will", "must", "not",
];

const SOFT_STOP_PHRASES: &[&str] = &[
    "reserved",
    "final",
    "age",
    "advance",
    "vehicle",
    "motor",
    "determination",
    "use your benefits",
    "responsibilities",
];

/// Inflected legal words and their canonical stem
const LEGAL_STEMS: &[(&str, &str)] = &[
    ("applicability", "applicability"),
    ("applicable", "applicability"),
    ("definition", "definition"),
    ("definitions", "definition"),
    ("authority", "authority"),
    ("purpose", "purpose"),
    ("scope", "scope"),
    ("penalties", "penalty"),
    ("penalty", "penalty"),
    ("compliance", "compliance"),
    ("requirement", "requirement"),
    ("requirements", "requirement"),
    ("reporting", "reporting"),
    ("report", "reporting"),
    ("reports", "reporting"),
    ("confidentiality", "confidentiality"),
    ("retaliation", "retaliation"),
    ("eligibility", "eligibility"),
    ("eligible", "eligibility"),
    ("payment", "payment"),
    ("payments", "payment"),
    ("investigation", "investigation"),
    ("training", "training"),
    ("recordkeeping", "recordkeeping"),
    ("supervision", "supervision"),
    ("grievance", "grievance"),
];

fn stem(word: &str) -> &str {
    LEGAL_STEMS
        .iter()
        .find(|(from, _)| *from == word)
        .map_or(word, |(_, to)| to)
}

fn is_legal_stem(word: &str) -> bool {
    LEGAL_STEMS.iter().any(|(_, to)| *to == word)
}

fn keep_word(word: &str) -> bool {
    if word.is_empty() || STOP_WORDS.contains(&word) {
        return false;
    }
    !(word.chars().any(|c| c.is_ascii_digit()) && word.chars().count() <= 2)
}

/// Repair mojibake, collapse whitespace and strip leading/trailing punctuation
pub fn clean_phrase(raw: &str) -> String {
    let text = repair_mojibake(raw);
    let text = WHITESPACE.replace_all(&text, " ");
    PUNCT_EDGES.replace_all(text.trim(), "").into_owned()
}

/// Lowercased phrase without stop words or tiny numeric tokens, legal words stemmed
pub fn normalize_keyphrase(raw: &str) -> String {
    clean_phrase(raw)
        .to_lowercase()
        .split_whitespace()
        .filter(|w| keep_word(w))
        .map(stem)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Multi-word phrases and bare legal stems are useful; soft stops and
/// possessives are not
pub fn looks_useful(phrase: &str) -> bool {
    if phrase.is_empty() || SOFT_STOP_PHRASES.contains(&phrase) || phrase.contains('\'') {
        return false;
    }
    phrase.split_whitespace().count() > 1 || is_legal_stem(phrase)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Phrases kept per document
    pub top_per_doc: usize,

    /// Documents a phrase must be selected in to become global
    pub min_df: usize,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            top_per_doc: 12,
            min_df: 1,
        }
    }
}

impl MiningConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_per_doc == 0 || self.min_df == 0 {
            return Err(SummaryError::invalid_config(
                "mining.top_per_doc and mining.min_df must be positive",
            ));
        }
        Ok(())
    }
}

/// Builds a lexicon from per-document term tables
#[derive(Debug, Clone, Default)]
pub struct LexiconMiner {
    config: MiningConfig,
    seeds: Vec<String>,
}

impl LexiconMiner {
    pub fn new(config: MiningConfig) -> Self {
        Self {
            config,
            seeds: Vec::new(),
        }
    }

    /// Extra phrases merged into the global list after normalization
    pub fn with_seeds(mut self, seeds: impl IntoIterator<Item = String>) -> Self {
        self.seeds.extend(seeds);
        self
    }

    /// Useful phrases of one document ranked by their best score
    fn document_phrases(&self, terms: &[TermRecord]) -> Vec<String> {
        let mut best: BTreeMap<String, f64> = BTreeMap::new();
        for record in terms {
            for term in &record.top_terms {
                let norm = normalize_keyphrase(&term.term);
                if norm.is_empty() {
                    continue;
                }
                let slot = best.entry(norm).or_insert(f64::NEG_INFINITY);
                *slot = slot.max(term.score);
            }
        }

        let mut ranked: Vec<(String, f64)> = best
            .into_iter()
            .filter(|(phrase, _)| looks_useful(phrase))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked
            .into_iter()
            .take(self.config.top_per_doc)
            .map(|(phrase, _)| phrase)
            .collect()
    }

    /// Mine `documents` (doc id → term records).
    ///
    /// `global_terms` is the sorted union of the seeds and every phrase
    /// selected in at least `min_df` documents.
    pub fn mine(&self, documents: &BTreeMap<String, Vec<TermRecord>>) -> Lexicon {
        let mut doc_specific = BTreeMap::new();
        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();

        for (doc_id, terms) in documents {
            let phrases = self.document_phrases(terms);
            for phrase in &phrases {
                *doc_freq.entry(phrase.clone()).or_default() += 1;
            }
            log::debug!("{doc_id}: {} lexicon phrases", phrases.len());
            doc_specific.insert(doc_id.clone(), phrases);
        }

        let mut global: BTreeSet<String> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= self.config.min_df)
            .map(|(phrase, _)| phrase)
            .collect();
        global.extend(
            self.seeds
                .iter()
                .map(|s| normalize_keyphrase(s))
                .filter(|s| !s.is_empty()),
        );

        log::info!(
            "Mined lexicon: {} global terms across {} documents",
            global.len(),
            doc_specific.len()
        );

        Lexicon {
            version: Some(1),
            notes: Some("Mined terms for waypoint seeding.".to_string()),
            global_terms: global.into_iter().collect(),
            doc_specific,
            patterns: Lexicon::default_patterns(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terms::TermScore;
    use pretty_assertions::assert_eq;

    fn record(terms: &[(&str, f64)]) -> TermRecord {
        TermRecord {
            sec_id: "§1.1".into(),
            heading: String::new(),
            term_density: 0.0,
            tfidf_sum: 0.0,
            top_terms: terms
                .iter()
                .map(|(t, s)| TermScore {
                    term: (*t).into(),
                    score: *s,
                })
                .collect(),
        }
    }

    #[test]
    fn keyphrases_are_normalized() {
        assert_eq!(normalize_keyphrase("  Reporting Requirements. "), "reporting requirement");
        assert_eq!(normalize_keyphrase("the Â§ definitions"), "§ definition");
        assert_eq!(normalize_keyphrase("use of the card"), "use card");
        assert_eq!(normalize_keyphrase("a 12 b"), "b");
        assert_eq!(normalize_keyphrase("---"), "");
    }

    #[test]
    fn usefulness_rules() {
        assert!(looks_useful("driver license"));
        assert!(looks_useful("penalty"));
        assert!(!looks_useful("license"));
        assert!(!looks_useful("reserved"));
        assert!(!looks_useful("state's license"));
        assert!(!looks_useful(""));
    }

    #[test]
    fn mines_global_and_document_terms() {
        let mut documents = BTreeMap::new();
        documents.insert(
            "cfr_6_37".to_string(),
            vec![record(&[("driver license", 0.9), ("license", 0.8), ("reporting requirements", 0.4)])],
        );
        documents.insert(
            "cfr_6_115".to_string(),
            vec![
                record(&[("sexual abuse", 0.7), ("reporting requirement", 0.5)]),
                record(&[("sexual abuse", 0.95)]),
            ],
        );

        let miner = LexiconMiner::new(MiningConfig {
            top_per_doc: 2,
            min_df: 2,
        })
        .with_seeds(vec!["REAL ID".to_string(), "the".to_string()]);
        let lexicon = miner.mine(&documents);

        assert_eq!(
            lexicon.doc_specific["cfr_6_37"],
            vec!["driver license", "reporting requirement"]
        );
        assert_eq!(
            lexicon.doc_specific["cfr_6_115"],
            vec!["sexual abuse", "reporting requirement"]
        );
        assert_eq!(lexicon.global_terms, vec!["real id", "reporting requirement"]);
        assert_eq!(lexicon.version, Some(1));
        assert!(lexicon.heading_patterns().is_ok());
        assert!(lexicon.validate().is_ok());
    }

    #[test]
    fn empty_documents_have_empty_lists() {
        let mut documents = BTreeMap::new();
        documents.insert("doc".to_string(), Vec::new());
        let lexicon = LexiconMiner::default().mine(&documents);
        assert_eq!(lexicon.doc_specific["doc"], Vec::<String>::new());
        assert!(lexicon.global_terms.is_empty());
    }
}
