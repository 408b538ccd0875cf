//! # DocuStitch Graph
//!
//! Section graph model, citation-graph diagnostics and the weighted merge of
//! explicit and implicit edges.
//!
//! ## Architecture
//!
//! ```text
//! Explicit edges ──┬──> Graph Analyzer (petgraph, diagnostics only)
//!                  │      ├─ pagerank (damping 0.85, ≤100 iterations)
//!                  │      ├─ in/out degree, in-span strength
//!                  │      └─ density, weak components, clustering
//!                  │
//! Implicit edges ──┴──> Graph Merger
//!                         ├─ normalize ids, drop self-loops / unknown endpoints
//!                         ├─ weight: w_explicit | w_implicit · score
//!                         ├─ one edge per (src, dst), heaviest wins
//!                         └─ per-node in/out weight + normalized centrality
//! ```

mod analyzer;
mod error;
mod merge;
mod types;

pub use analyzer::{GraphAnalysis, GraphAnalyzer, GraphMetrics, NodeMetrics};
pub use error::{GraphError, Result};
pub use merge::{GraphMerger, MergeWeights};
pub use types::{Edge, EdgeMethod, EdgeType, GraphNode, MergedGraph, SectionGraph};
