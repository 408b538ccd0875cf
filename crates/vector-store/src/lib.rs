//! # DocuStitch Vector Store
//!
//! Text embeddings, a dense similarity index and the implicit (semantic)
//! edge builder.
//!
//! ## Architecture
//!
//! ```text
//! Section heading + text (or anchor gist)
//!     │
//!     ├──> Embedding Model (--embed-mode / DOCUSTITCH_EMBEDDING_MODE)
//!     │      ├─ onnx:   sentence model via onnxruntime, mean-pooled (default)
//!     │      ├─ hashed: signed feature hashing of words + bigrams
//!     │      └─ stub:   text-seeded pseudo-random vectors
//!     │      └─> unit vectors, cosine == dot product
//!     │
//!     ├──> Vector Index (ndarray matrix, brute force)
//!     │
//!     └──> Implicit Edge Builder
//!            ├─ top-k inside ± window
//!            ├─ optional top-global_k outside the window
//!            └─ first edge per (src, dst) wins, optional mirrored edges
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use docustitch_sections::SectionSet;
//! use docustitch_vector_store::{EmbeddingModel, ImplicitConfig, ImplicitEdgeBuilder, QuerySet};
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> docustitch_vector_store::Result<()> {
//!     let model = EmbeddingModel::new()?;
//!     let sections = SectionSet::new("doc", Vec::new());
//!     let config = ImplicitConfig { queries: QuerySet::All, ..ImplicitConfig::default() };
//!     let edges = ImplicitEdgeBuilder::new(config, &model)
//!         .build(&sections, &[], &HashMap::new())
//!         .await?;
//!     println!("{} implicit edges", edges.len());
//!     Ok(())
//! }
//! ```

mod embeddings;
mod error;
mod implicit;
mod index;
#[cfg(feature = "onnx")]
mod onnx;

pub use embeddings::{
    EmbeddingConfig, EmbeddingMode, EmbeddingModel, DEFAULT_DIMENSION, DEFAULT_MODEL,
};
pub use error::{Result, VectorStoreError};
pub use implicit::{ImplicitConfig, ImplicitEdgeBuilder, QuerySet};
pub use index::VectorIndex;
