use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

static DEFAULT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("valid token regex"));

/// Vectorizer settings
#[derive(Debug, Clone)]
pub struct TfidfConfig {
    /// Inclusive `(min_n, max_n)` word n-gram range
    pub ngram_range: (usize, usize),

    /// Drop terms found in fewer documents than this
    pub min_df: usize,

    /// Drop terms found in more than this fraction of documents
    pub max_df: f64,

    /// Keep only the most frequent terms across the corpus
    pub max_features: Option<usize>,

    /// Use `1 + ln(tf)` instead of raw counts
    pub sublinear_tf: bool,

    /// Removed before n-grams are formed
    pub stop_words: BTreeSet<String>,

    pub token_pattern: Regex,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            ngram_range: (1, 1),
            min_df: 1,
            max_df: 1.0,
            max_features: None,
            sublinear_tf: false,
            stop_words: BTreeSet::new(),
            token_pattern: Regex::clone(&DEFAULT_TOKEN),
        }
    }
}

impl TfidfConfig {
    /// Lowercase, tokenize, drop stop words, then emit n-grams joined by a space
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = self
            .token_pattern
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|t| !self.stop_words.contains(*t))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut grams = Vec::new();
        for n in min_n.max(1)..=max_n {
            if n > tokens.len() {
                break;
            }
            grams.extend(tokens.windows(n).map(|w| w.join(" ")));
        }
        grams
    }
}

/// Sparse row: `(term index, weight)` sorted by index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(usize, f64)>,
}

impl SparseVector {
    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    /// Number of non-zero weights
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dot(&self, other: &Self) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (a, wa) = self.entries[i];
            let (b, wb) = other.entries[j];
            match a.cmp(&b) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wa * wb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Fitted TF-IDF vocabulary with smoothed idf and L2-normalized rows.
///
/// Term indices follow lexical order of the vocabulary.
#[derive(Debug, Clone)]
pub struct TfidfSpace {
    config: TfidfConfig,
    vocabulary: BTreeMap<String, usize>,
    terms: Vec<String>,
    idf: Vec<f64>,
}

impl TfidfSpace {
    /// Fit on `documents` and return the space together with their vectors.
    ///
    /// When `min_df`/`max_df`/`max_features` pruning would leave nothing, the
    /// unpruned vocabulary is kept instead.
    pub fn fit_transform(config: TfidfConfig, documents: &[&str]) -> (Self, Vec<SparseVector>) {
        let analyzed: Vec<Vec<String>> = documents.iter().map(|d| config.analyze(d)).collect();

        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        let mut total: BTreeMap<&str, usize> = BTreeMap::new();
        for grams in &analyzed {
            let mut unique = BTreeSet::new();
            for gram in grams {
                *total.entry(gram.as_str()).or_default() += 1;
                unique.insert(gram.as_str());
            }
            for gram in unique {
                *df.entry(gram).or_default() += 1;
            }
        }

        let n_docs = documents.len();
        let max_doc_count = config.max_df * n_docs as f64;
        let mut kept: Vec<&str> = df
            .iter()
            .filter(|&(_, &count)| count >= config.min_df && count as f64 <= max_doc_count)
            .map(|(term, _)| *term)
            .collect();
        if let Some(limit) = config.max_features {
            if kept.len() > limit {
                kept.sort_by(|a, b| total[b].cmp(&total[a]).then_with(|| a.cmp(b)));
                kept.truncate(limit);
                kept.sort_unstable();
            }
        }
        if kept.is_empty() && !df.is_empty() {
            log::debug!(
                "Document-frequency pruning removed all {} terms; keeping the full vocabulary",
                df.len()
            );
            kept = df.keys().copied().collect();
        }

        let terms: Vec<String> = kept.iter().map(|t| (*t).to_string()).collect();
        let vocabulary: BTreeMap<String, usize> = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        let idf: Vec<f64> = terms
            .iter()
            .map(|t| {
                let d = df[t.as_str()] as f64;
                ((1.0 + n_docs as f64) / (1.0 + d)).ln() + 1.0
            })
            .collect();

        let space = Self {
            config,
            vocabulary,
            terms,
            idf,
        };
        let vectors = analyzed.iter().map(|grams| space.vectorize(grams)).collect();
        (space, vectors)
    }

    /// Vectorize unseen text; terms outside the vocabulary are ignored
    pub fn transform(&self, text: &str) -> SparseVector {
        self.vectorize(&self.config.analyze(text))
    }

    fn vectorize(&self, grams: &[String]) -> SparseVector {
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for gram in grams {
            if let Some(&idx) = self.vocabulary.get(gram) {
                *counts.entry(idx).or_default() += 1;
            }
        }

        let mut entries: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(idx, tf)| {
                let tf = tf as f64;
                let tf = if self.config.sublinear_tf { 1.0 + tf.ln() } else { tf };
                (idx, tf * self.idf[idx])
            })
            .collect();
        entries.sort_unstable_by_key(|(idx, _)| *idx);

        let norm = entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut entries {
                *w /= norm;
            }
        }
        SparseVector { entries }
    }

    pub fn term(&self, idx: usize) -> Option<&str> {
        self.terms.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn analyzer_builds_ngrams_after_stop_words() {
        let config = TfidfConfig {
            ngram_range: (1, 2),
            stop_words: ["the".to_string()].into_iter().collect(),
            ..TfidfConfig::default()
        };
        assert_eq!(
            config.analyze("The State issues the License"),
            vec!["state", "issues", "license", "state issues", "issues license"]
        );
    }

    #[test]
    fn vectors_are_unit_norm_and_share_terms() {
        let docs = ["driver license issuance", "driver license renewal", "marine fisheries"];
        let (space, vectors) = TfidfSpace::fit_transform(TfidfConfig::default(), &docs);
        assert_eq!(space.len(), 6);
        assert_eq!(space.term(0), Some("driver"));
        for v in &vectors {
            let norm: f64 = v.entries().iter().map(|(_, w)| w * w).sum();
            assert!((norm - 1.0).abs() < 1e-9);
        }
        assert!(vectors[0].dot(&vectors[1]) > vectors[0].dot(&vectors[2]));
        assert_eq!(vectors[0].dot(&vectors[2]), 0.0);
    }

    #[test]
    fn idf_is_smoothed() {
        let docs = ["alpha beta", "alpha gamma"];
        let (_, vectors) = TfidfSpace::fit_transform(TfidfConfig::default(), &docs);
        // alpha: idf 1.0; beta: ln(3/2) + 1
        let beta_idf = (3.0f64 / 2.0).ln() + 1.0;
        let norm = (1.0 + beta_idf * beta_idf).sqrt();
        let weights: Vec<f64> = vectors[0].entries().iter().map(|(_, w)| *w).collect();
        assert!((weights[0] - 1.0 / norm).abs() < 1e-12);
        assert!((weights[1] - beta_idf / norm).abs() < 1e-12);
    }

    #[test]
    fn pruning_that_empties_vocabulary_is_skipped() {
        let config = TfidfConfig {
            max_df: 0.9,
            ..TfidfConfig::default()
        };
        let (space, vectors) = TfidfSpace::fit_transform(config, &["one single sentence"]);
        assert_eq!(space.len(), 3);
        assert_eq!(vectors[0].nnz(), 3);
    }

    #[test]
    fn min_df_and_max_features_prune() {
        let config = TfidfConfig {
            min_df: 2,
            ..TfidfConfig::default()
        };
        let (space, _) = TfidfSpace::fit_transform(config, &["aa bb cc", "aa bb", "aa dd"]);
        assert_eq!((space.term(0), space.term(1), space.len()), (Some("aa"), Some("bb"), 2));

        let config = TfidfConfig {
            max_features: Some(1),
            ..TfidfConfig::default()
        };
        let (space, _) = TfidfSpace::fit_transform(config, &["aa bb cc", "aa bb", "aa dd"]);
        assert_eq!(space.len(), 1);
        assert_eq!(space.term(0), Some("aa"));
    }

    #[test]
    fn transform_ignores_unknown_terms() {
        let (space, _) = TfidfSpace::fit_transform(TfidfConfig::default(), &["alpha beta"]);
        assert!(space.transform("gamma delta").is_empty());
        assert_eq!(space.transform("alpha gamma").nnz(), 1);
    }

    #[test]
    fn empty_corpus() {
        let (space, vectors) = TfidfSpace::fit_transform(TfidfConfig::default(), &[]);
        assert!(space.is_empty());
        assert!(vectors.is_empty());
    }
}
