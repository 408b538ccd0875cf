use crate::error::{Result, SectionsError};
use crate::types::{Section, SectionRecord, SectionSet};
use serde::{Deserialize, Serialize};

/// Which path produced the section list for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionSource {
    /// Records whose `doc_id` matched the request
    Exact,

    /// No record matched; the first document in the file was used instead
    FirstAvailable { doc_id: String },
}

/// Sections picked for one document, tagged with how they were found
#[derive(Debug, Clone)]
pub struct DocumentSelection {
    pub sections: SectionSet,
    pub source: SelectionSource,
}

impl DocumentSelection {
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self.source, SelectionSource::FirstAvailable { .. })
    }
}

/// Pick the sections of `doc_id` out of a (possibly multi-document) record list.
///
/// Records without a `doc_id` belong to the requested document. When nothing
/// matches, the first document in file order is used and the selection is
/// tagged `FirstAvailable`. An empty record list yields an empty exact
/// selection: an empty document is valid input.
pub fn select_document(records: Vec<SectionRecord>, doc_id: &str) -> Result<DocumentSelection> {
    if records.is_empty() {
        return Ok(DocumentSelection {
            sections: SectionSet::new(doc_id, Vec::new()),
            source: SelectionSource::Exact,
        });
    }

    let matches_request =
        |record: &SectionRecord| record.doc_id.as_deref().map_or(true, |id| id == doc_id);

    if records.iter().any(matches_request) {
        let sections = records
            .into_iter()
            .filter(matches_request)
            .filter_map(|record| Section::from_record(record, doc_id))
            .collect();
        return Ok(DocumentSelection {
            sections: SectionSet::new(doc_id, sections),
            source: SelectionSource::Exact,
        });
    }

    let first = records
        .iter()
        .find_map(|record| record.doc_id.clone())
        .ok_or_else(|| SectionsError::DocumentNotFound(doc_id.to_string()))?;

    log::warn!(
        "No sections for document '{}'; falling back to first available document '{}'",
        doc_id,
        first
    );

    let sections = records
        .into_iter()
        .filter(|record| record.doc_id.as_deref() == Some(first.as_str()))
        .filter_map(|record| Section::from_record(record, &first))
        .collect();

    Ok(DocumentSelection {
        sections: SectionSet::new(doc_id, sections),
        source: SelectionSource::FirstAvailable { doc_id: first },
    })
}

/// Distinct document ids in file order
#[must_use]
pub fn document_ids(records: &[SectionRecord]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for record in records {
        if let Some(id) = &record.doc_id {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doc: &str, sec: &str) -> SectionRecord {
        SectionRecord {
            doc_id: Some(doc.to_string()),
            sec_id: Some(sec.to_string()),
            text: Some("Some section text here.".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn selects_exact_document() {
        let records = vec![record("a", "§1.1"), record("b", "§2.1"), record("a", "§1.2")];
        let selection = select_document(records, "a").unwrap();
        assert_eq!(selection.source, SelectionSource::Exact);
        assert_eq!(selection.sections.ids(), vec!["§1.1", "§1.2"]);
    }

    #[test]
    fn falls_back_to_first_document_with_tag() {
        let records = vec![record("b", "§2.1"), record("c", "§3.1")];
        let selection = select_document(records, "a").unwrap();
        assert!(selection.is_fallback());
        assert_eq!(
            selection.source,
            SelectionSource::FirstAvailable {
                doc_id: "b".to_string()
            }
        );
        assert_eq!(selection.sections.ids(), vec!["§2.1"]);
        assert_eq!(selection.sections.doc_id(), "a");
    }

    #[test]
    fn empty_input_is_an_empty_document() {
        let selection = select_document(Vec::new(), "a").unwrap();
        assert!(selection.sections.is_empty());
        assert!(!selection.is_fallback());
    }

    #[test]
    fn lists_document_ids_in_order() {
        let records = vec![record("b", "§2.1"), record("a", "§1.1"), record("b", "§2.2")];
        assert_eq!(document_ids(&records), vec!["b", "a"]);
    }
}
