//! # DocuStitch Sections
//!
//! Shared data model and utilities for every pipeline stage.
//!
//! ## Architecture
//!
//! ```text
//! sections.jsonl (ingestion output)
//!     │
//!     ├──> Document selection (exact doc_id, or tagged fallback)
//!     │      └─> SectionSet (ordered, deduplicated, id-normalized)
//!     │
//!     ├──> Text utilities
//!     │      ├─ mojibake repair / whitespace cleanup
//!     │      ├─ sentence split (legal-friendly)
//!     │      └─ word tokens / word counts
//!     │
//!     ├──> Lexicon (global + doc-specific phrases, heading patterns)
//!     │
//!     └──> ArtifactStore (per-document JSONL namespace)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use docustitch_sections::{select_document, ArtifactStore, SectionRecord};
//!
//! #[tokio::main]
//! async fn main() -> docustitch_sections::Result<()> {
//!     let records: Vec<SectionRecord> =
//!         ArtifactStore::read_jsonl_file("artifacts/sections.jsonl").await?;
//!     let selection = select_document(records, "cfr_6_37")?;
//!     println!("{} sections ({:?})", selection.sections.len(), selection.source);
//!     Ok(())
//! }
//! ```

mod artifacts;
mod error;
mod id;
mod lexicon;
mod selection;
mod text;
mod types;

pub use artifacts::{Artifact, ArtifactStore};
pub use error::{Result, SectionsError};
pub use id::{is_local_section_token, normalize_sec_id, part_prefix, SectionNumber};
pub use lexicon::{HeadingPatterns, Lexicon};
pub use selection::{document_ids, select_document, DocumentSelection, SelectionSource};
pub use text::{clean_text, repair_mojibake, split_sentences, word_count, words};
pub use types::{Section, SectionRecord, SectionSet};
