use crate::error::{Result, SectionsError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFINITIONS_HEADING_KEY: &str = "definitions_heading";
pub const APPLICABILITY_HEADING_KEY: &str = "applicability_heading";
pub const SECTION_LABEL_KEY: &str = "section_label";

const DEFAULT_DEFINITIONS_HEADING: &str = r"(?i)\bdefinitions?\b";
const DEFAULT_APPLICABILITY_HEADING: &str = r"(?i)\bapplicability\b";
const DEFAULT_SECTION_LABEL: &str = r"\x{00A7}{1,2}\s*\d{1,3}\.\d{1,4}(?:\([a-z0-9ivxl]+\))*";

/// Phrase lists and heading patterns used for salience scoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lexicon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Phrases relevant to every document
    #[serde(default)]
    pub global_terms: Vec<String>,

    /// Phrases relevant to one document, keyed by `doc_id`
    #[serde(default)]
    pub doc_specific: BTreeMap<String, Vec<String>>,

    /// Named regexes (`definitions_heading`, `applicability_heading`, ...)
    #[serde(default)]
    pub patterns: BTreeMap<String, String>,
}

/// Compiled heading patterns
#[derive(Debug, Clone)]
pub struct HeadingPatterns {
    pub definitions: Regex,
    pub applicability: Regex,
}

impl Lexicon {
    /// Load a lexicon; the format follows the extension (`.yaml`/`.yml`, `.toml`, otherwise JSON).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SectionsError::missing(path));
            }
            Err(err) => return Err(err.into()),
        };
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let lexicon = Self::parse(&raw, &extension)?;
        log::debug!(
            "Loaded lexicon {}: {} global terms, {} documents",
            path.display(),
            lexicon.global_terms.len(),
            lexicon.doc_specific.len()
        );
        Ok(lexicon)
    }

    /// Parse lexicon text in the given format (`yaml`, `yml`, `toml`, `json`)
    pub fn parse(raw: &str, format: &str) -> Result<Self> {
        let lexicon: Self = match format {
            "yaml" | "yml" => serde_yaml::from_str(raw)
                .map_err(|e| SectionsError::invalid_lexicon(format!("YAML: {e}")))?,
            "toml" => toml::from_str(raw)
                .map_err(|e| SectionsError::invalid_lexicon(format!("TOML: {e}")))?,
            _ => serde_json::from_str(raw)
                .map_err(|e| SectionsError::invalid_lexicon(format!("JSON: {e}")))?,
        };
        lexicon.validate()?;
        Ok(lexicon)
    }

    /// Every configured pattern must compile
    pub fn validate(&self) -> Result<()> {
        for (name, pattern) in &self.patterns {
            Regex::new(pattern).map_err(|e| {
                SectionsError::invalid_lexicon(format!("pattern '{name}' does not compile: {e}"))
            })?;
        }
        Ok(())
    }

    /// Global phrases followed by the phrases specific to `doc_id`
    #[must_use]
    pub fn terms_for(&self, doc_id: &str) -> Vec<&str> {
        self.global_terms
            .iter()
            .chain(self.doc_specific.get(doc_id).into_iter().flatten())
            .map(String::as_str)
            .collect()
    }

    /// Compile heading patterns, falling back to the built-in defaults
    pub fn heading_patterns(&self) -> Result<HeadingPatterns> {
        let compile = |key: &str, default: &str| -> Result<Regex> {
            let pattern = self.patterns.get(key).map_or(default, String::as_str);
            Regex::new(pattern).map_err(|e| {
                SectionsError::invalid_lexicon(format!("pattern '{key}' does not compile: {e}"))
            })
        };
        Ok(HeadingPatterns {
            definitions: compile(DEFINITIONS_HEADING_KEY, DEFAULT_DEFINITIONS_HEADING)?,
            applicability: compile(APPLICABILITY_HEADING_KEY, DEFAULT_APPLICABILITY_HEADING)?,
        })
    }

    /// The pattern set written by lexicon mining
    #[must_use]
    pub fn default_patterns() -> BTreeMap<String, String> {
        BTreeMap::from([
            (SECTION_LABEL_KEY.to_string(), DEFAULT_SECTION_LABEL.to_string()),
            (
                DEFINITIONS_HEADING_KEY.to_string(),
                DEFAULT_DEFINITIONS_HEADING.to_string(),
            ),
            (
                APPLICABILITY_HEADING_KEY.to_string(),
                DEFAULT_APPLICABILITY_HEADING.to_string(),
            ),
        ])
    }

    /// Serialize in the format matching `path`'s extension
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let body = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| SectionsError::invalid_lexicon(format!("YAML: {e}")))?,
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| SectionsError::invalid_lexicon(format!("TOML: {e}")))?,
            _ => serde_json::to_string_pretty(self)?,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const YAML: &str = r#"
global_terms:
  - real id
  - state
doc_specific:
  cfr_6_37:
    - driver license
patterns:
  definitions_heading: "(?i)\\bdefinitions?\\b"
"#;

    #[test]
    fn parses_yaml_and_merges_terms() {
        let lexicon = Lexicon::parse(YAML, "yaml").unwrap();
        assert_eq!(
            lexicon.terms_for("cfr_6_37"),
            vec!["real id", "state", "driver license"]
        );
        assert_eq!(lexicon.terms_for("other"), vec!["real id", "state"]);
    }

    #[test]
    fn heading_patterns_fall_back_to_defaults() {
        let lexicon = Lexicon::parse(YAML, "yaml").unwrap();
        let patterns = lexicon.heading_patterns().unwrap();
        assert!(patterns.definitions.is_match("Definitions."));
        assert!(patterns.applicability.is_match("Applicability and scope"));
        assert!(!patterns.applicability.is_match("Purpose"));
    }

    #[test]
    fn rejects_invalid_patterns() {
        let raw = r#"{"patterns": {"definitions_heading": "(unclosed"}}"#;
        assert!(matches!(
            Lexicon::parse(raw, "json"),
            Err(SectionsError::InvalidLexicon(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_is_missing_input() {
        let tmp = TempDir::new().unwrap();
        let err = Lexicon::load(tmp.path().join("lexicon.yaml"))
            .await
            .unwrap_err();
        assert!(err.is_missing_input());
    }

    #[tokio::test]
    async fn save_and_load_roundtrip_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lexicon.json");
        let lexicon = Lexicon {
            global_terms: vec!["reporting".into()],
            patterns: Lexicon::default_patterns(),
            ..Default::default()
        };
        lexicon.save(&path).await.unwrap();
        assert_eq!(Lexicon::load(&path).await.unwrap(), lexicon);
    }
}
