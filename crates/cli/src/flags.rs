use clap::ValueEnum;
use docustitch_vector_store::{EmbeddingMode, QuerySet};

#[derive(Copy, Clone, ValueEnum)]
pub(crate) enum EmbedModeFlag {
    Onnx,
    Hashed,
    Stub,
}

impl EmbedModeFlag {
    pub(crate) const fn as_domain(self) -> EmbeddingMode {
        match self {
            EmbedModeFlag::Onnx => EmbeddingMode::Onnx,
            EmbedModeFlag::Hashed => EmbeddingMode::Hashed,
            EmbedModeFlag::Stub => EmbeddingMode::Stub,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
pub(crate) enum QueriesFlag {
    Anchors,
    All,
}

impl QueriesFlag {
    pub(crate) const fn as_domain(self) -> QuerySet {
        match self {
            QueriesFlag::Anchors => QuerySet::Anchors,
            QueriesFlag::All => QuerySet::All,
        }
    }
}
