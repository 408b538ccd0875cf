use crate::extractor::Reference;
use docustitch_sections::normalize_sec_id;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Per-section agreement between two reference extractions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceAgreement {
    pub sec_id: String,
    pub truth_refs: usize,
    pub candidate_refs: usize,
    pub overlap: usize,
    pub only_truth: usize,
    pub only_candidate: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Score `candidate` tokens against `truth` tokens, section by section.
///
/// Rows follow the order of `truth`. A section absent from `candidate` counts
/// as an empty candidate set. Empty sets score 1.0 where nothing was missed
/// or invented; F1 is 0.0 when precision and recall are both 0.
pub fn compare_references(truth: &[Reference], candidate: &[Reference]) -> Vec<ReferenceAgreement> {
    let by_id: HashMap<String, BTreeSet<&str>> = candidate
        .iter()
        .map(|r| {
            (
                normalize_sec_id(&r.sec_id),
                r.explicit_refs.iter().map(String::as_str).collect(),
            )
        })
        .collect();
    let empty = BTreeSet::new();

    truth
        .iter()
        .map(|reference| {
            let sec_id = normalize_sec_id(&reference.sec_id);
            let expected: BTreeSet<&str> = reference.explicit_refs.iter().map(String::as_str).collect();
            let found = by_id.get(&sec_id).unwrap_or(&empty);

            let overlap = expected.intersection(found).count();
            let precision = if found.is_empty() {
                if expected.is_empty() {
                    1.0
                } else {
                    0.0
                }
            } else {
                overlap as f64 / found.len() as f64
            };
            let recall = if expected.is_empty() {
                1.0
            } else {
                overlap as f64 / expected.len() as f64
            };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            ReferenceAgreement {
                sec_id,
                truth_refs: expected.len(),
                candidate_refs: found.len(),
                overlap,
                only_truth: expected.len() - overlap,
                only_candidate: found.len() - overlap,
                precision: round3(precision),
                recall: round3(recall),
                f1: round3(f1),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reference(sec_id: &str, refs: &[&str]) -> Reference {
        Reference {
            doc_id: "doc".into(),
            sec_id: sec_id.into(),
            heading: String::new(),
            explicit_refs: refs.iter().map(|s| s.to_string()).collect(),
            spans: Vec::new(),
        }
    }

    #[test]
    fn partial_overlap() {
        let truth = vec![reference("§1.1", &["§1.2", "§1.3", "§1.4"])];
        let candidate = vec![reference("§ 1.1", &["§1.2", "§1.3", "§1.9"])];
        let rows = compare_references(&truth, &candidate);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!((row.overlap, row.only_truth, row.only_candidate), (2, 1, 1));
        assert_eq!(row.precision, 0.667);
        assert_eq!(row.recall, 0.667);
        assert_eq!(row.f1, 0.667);
    }

    #[test]
    fn empty_set_conventions() {
        let truth = vec![
            reference("§1.1", &[]),
            reference("§1.2", &["§1.1"]),
            reference("§1.3", &[]),
        ];
        let candidate = vec![reference("§1.3", &["§1.1"])];
        let rows = compare_references(&truth, &candidate);
        let scores: Vec<_> = rows.iter().map(|r| (r.precision, r.recall, r.f1)).collect();
        assert_eq!(scores, vec![(1.0, 1.0, 1.0), (0.0, 0.0, 0.0), (0.0, 1.0, 0.0)]);
    }
}
