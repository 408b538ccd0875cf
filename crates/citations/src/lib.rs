//! # DocuStitch Citations
//!
//! Finds citation tokens in section text and turns in-document citations into
//! explicit graph edges.
//!
//! ## Architecture
//!
//! ```text
//! Section text
//!     │
//!     ├──> Base patterns (fixed priority)
//!     │      range → local → in-word → cross-doc section → cross-doc part
//!     │      └─> typed spans + normalized tokens
//!     │
//!     ├──> Enrichers (strictly additive)
//!     │
//!     └──> Explicit Edge Builder
//!            ├─ keep local `§part.section` tokens naming a known section
//!            ├─ drop self references and cross-document tokens
//!            └─ one edge per (src, dst) with its citing span count
//! ```
//!
//! ## Example
//!
//! ```rust
//! use docustitch_citations::ReferenceExtractor;
//! use docustitch_sections::{Section, SectionSet};
//!
//! let sections = SectionSet::new(
//!     "cfr_1",
//!     vec![
//!         Section::new("cfr_1", "§1.1", "Purpose", "See §1.3 and 6 CFR part 37."),
//!         Section::new("cfr_1", "§1.3", "Definitions", "Terms used in this part."),
//!     ],
//! );
//! let extractor = ReferenceExtractor::new();
//! let refs = extractor.extract_all(&sections);
//! assert_eq!(refs[0].explicit_refs, vec!["6CFR part 37", "§1.3"]);
//!
//! let edges = docustitch_citations::build_explicit_edges(&sections, &refs);
//! assert_eq!(edges.len(), 1);
//! ```

mod agreement;
mod edges;
mod enrich;
mod extractor;
mod patterns;

pub use agreement::{compare_references, ReferenceAgreement};
pub use edges::{build_explicit_edges, build_explicit_edges_with, EdgeOptions};
pub use enrich::{CfrCitationParser, CitationEnricher};
pub use extractor::{
    citation_tokens, expand_range, find_spans, CitationSpan, Reference, ReferenceExtractor,
    SpanKind, MAX_RANGE_SPAN,
};
