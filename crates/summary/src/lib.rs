//! # DocuStitch Summary
//!
//! Everything between the merged section graph and the final text: term
//! statistics, waypoint salience, extractive gists, stitching, budgeted
//! rendering and refinement.
//!
//! ## Architecture
//!
//! ```text
//! Sections ──> Term Extractor (TF-IDF 1-3 grams, sublinear tf)
//!                 │
//!                 ▼
//! Terms + refs + explicit edges + lexicon ──> Waypoint Scorer
//!                 │   blend(term, lexicon, centrality, heading, xref)
//!                 ▼
//! Waypoints ──> Gist Builder (±window sentences, MMR over TF-IDF)
//!                 │
//!                 ▼
//! Waypoints + merged graph ──> Stitcher (anchor, then top-k new neighbours)
//!                 │
//!                 ▼
//! Stitched plan + gists ──> Renderer (greedy word budget)
//!                 │
//!                 ▼
//! Draft ──> Refiner (pluggable backend, hard word cap)
//! ```
//!
//! [`LexiconMiner`] closes the loop: term tables of many documents are mined
//! into a lexicon that seeds the next run's lexicon signal.

mod error;
mod gists;
mod lexicon_mining;
pub mod mmr;
mod refine;
mod render;
mod stitch;
mod terms;
mod tfidf;
mod waypoints;

pub use error::{Result, SummaryError};
pub use gists::{Gist, GistBuilder, GistConfig, SourceSpan};
pub use lexicon_mining::{
    clean_phrase, looks_useful, normalize_keyphrase, LexiconMiner, MiningConfig,
};
pub use refine::{
    build_refine_context, hard_word_cap, refine_draft, PassthroughRefiner, RefineRequest, Refiner,
    MAX_CONTEXT_ITEMS,
};
pub use render::{fallback_text, BlockSource, RenderConfig, RenderedBlock, Renderer, Summary};
pub use stitch::{Role, StitchConfig, StitchedItem, Stitcher};
pub use terms::{TermConfig, TermExtractor, TermRecord, TermScore, DOMAIN_STOP_WORDS};
pub use tfidf::{SparseVector, TfidfConfig, TfidfSpace};
pub use waypoints::{
    min_max_normalize, SalienceInputs, SignalWeights, Waypoint, WaypointConfig, WaypointScorer,
    WAYPOINT_REASON,
};
