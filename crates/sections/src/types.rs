use crate::id::normalize_sec_id;
use crate::text::word_count;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw section record as emitted by ingestion (one JSONL line)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRecord {
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub sec_id: Option<String>,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub hierarchy_path: Vec<String>,
    #[serde(default, alias = "token_count")]
    pub tokens: Option<usize>,
}

/// Smallest addressable unit of a regulation part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub doc_id: String,

    /// Canonical id, e.g. `§37.3`; unique within a document
    pub sec_id: String,

    pub heading: String,
    pub text: String,

    #[serde(default, alias = "tokens")]
    pub token_count: usize,

    #[serde(default)]
    pub hierarchy_path: Vec<String>,
}

impl Section {
    pub fn new(
        doc_id: impl Into<String>,
        sec_id: &str,
        heading: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Self {
            doc_id: doc_id.into(),
            sec_id: normalize_sec_id(sec_id),
            heading: heading.into(),
            token_count: word_count(&text),
            text,
            hierarchy_path: Vec::new(),
        }
    }

    /// Build from a raw record; records without a section id are dropped
    pub fn from_record(record: SectionRecord, fallback_doc_id: &str) -> Option<Self> {
        let sec_id = normalize_sec_id(record.sec_id.as_deref()?);
        if sec_id.is_empty() {
            return None;
        }
        let text = record.text.unwrap_or_default();
        let token_count = record.tokens.unwrap_or_else(|| word_count(&text));
        Some(Self {
            doc_id: record
                .doc_id
                .unwrap_or_else(|| fallback_doc_id.to_string()),
            sec_id,
            heading: record.heading.unwrap_or_default(),
            text,
            token_count,
            hierarchy_path: record.hierarchy_path,
        })
    }
}

/// Sections of one document in reading order, indexed by `sec_id`
#[derive(Debug, Clone, Default)]
pub struct SectionSet {
    doc_id: String,
    sections: Vec<Section>,
    positions: HashMap<String, usize>,
}

impl SectionSet {
    /// Build a set; ids are normalized and duplicate ids keep their first occurrence.
    pub fn new(doc_id: impl Into<String>, sections: Vec<Section>) -> Self {
        let mut kept = Vec::with_capacity(sections.len());
        let mut positions = HashMap::with_capacity(sections.len());

        for mut section in sections {
            section.sec_id = normalize_sec_id(&section.sec_id);
            if section.sec_id.is_empty() || positions.contains_key(&section.sec_id) {
                log::debug!("Dropping duplicate or empty section id '{}'", section.sec_id);
                continue;
            }
            positions.insert(section.sec_id.clone(), kept.len());
            kept.push(section);
        }

        Self {
            doc_id: doc_id.into(),
            sections: kept,
            positions,
        }
    }

    #[must_use]
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// Document-order position of a section id
    #[must_use]
    pub fn position(&self, sec_id: &str) -> Option<usize> {
        self.positions.get(sec_id).copied()
    }

    #[must_use]
    pub fn get(&self, sec_id: &str) -> Option<&Section> {
        self.position(sec_id).map(|idx| &self.sections[idx])
    }

    #[must_use]
    pub fn contains(&self, sec_id: &str) -> bool {
        self.positions.contains_key(sec_id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.sec_id.as_str()).collect()
    }

    /// Sections within `±window` of `position`, clamped to the document
    #[must_use]
    pub fn window(&self, position: usize, window: usize) -> &[Section] {
        if self.sections.is_empty() || position >= self.sections.len() {
            return &[];
        }
        let lo = position.saturating_sub(window);
        let hi = position.saturating_add(window).min(self.sections.len() - 1);
        &self.sections[lo..=hi]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
