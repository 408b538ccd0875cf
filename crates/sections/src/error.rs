use std::path::PathBuf;
use thiserror::Error;

/// Result type for section loading and artifact operations
pub type Result<T> = std::result::Result<T, SectionsError>;

/// Errors raised while loading sections, lexicons and stage artifacts
#[derive(Error, Debug)]
pub enum SectionsError {
    /// A declared upstream artifact does not exist
    #[error("Missing input: {}", path.display())]
    MissingInput { path: PathBuf },

    /// No document could be selected from a sections file
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Lexicon could not be parsed or contains an invalid pattern
    #[error("Invalid lexicon: {0}")]
    InvalidLexicon(String),

    /// A JSONL line could not be decoded
    #[error("Malformed record in {} at line {line}: {source}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SectionsError {
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::MissingInput { path: path.into() }
    }

    pub fn invalid_lexicon(msg: impl Into<String>) -> Self {
        Self::InvalidLexicon(msg.into())
    }

    /// True when the error is the fatal "upstream artifact missing" case
    #[must_use]
    pub const fn is_missing_input(&self) -> bool {
        matches!(self, Self::MissingInput { .. })
    }
}
