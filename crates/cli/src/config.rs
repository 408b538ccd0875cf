use anyhow::{bail, Context as AnyhowContext, Result};
use docustitch_citations::EdgeOptions;
use docustitch_graph::MergeWeights;
use docustitch_summary::{
    GistConfig, MiningConfig, RenderConfig, StitchConfig, TermConfig, WaypointConfig,
};
use docustitch_vector_store::{EmbeddingConfig, ImplicitConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Run the long-form citation enricher after the base patterns
    pub enrich: bool,

    /// Resolve `§X.Y(a)` citations to `§X.Y` when no exact id matches
    pub strip_clauses: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            enrich: true,
            strip_clauses: false,
        }
    }
}

impl ExtractConfig {
    pub fn edge_options(&self) -> EdgeOptions {
        EdgeOptions {
            strip_clauses: self.strip_clauses,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Word budget for refined text; the render budget when unset
    pub budget_words: Option<usize>,
}

/// Every stage's knobs. Loaded from TOML, then overridden by CLI flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub extract: ExtractConfig,
    pub embedding: EmbeddingConfig,
    pub implicit: ImplicitConfig,
    pub merge: MergeWeights,
    pub terms: TermConfig,
    pub waypoints: WaypointConfig,
    pub gists: GistConfig,
    pub stitch: StitchConfig,
    pub render: RenderConfig,
    pub refine: RefineConfig,
    pub mining: MiningConfig,
}

impl PipelineConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Defaults, or the file at `path` when given
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path).await,
            None => Ok(Self::default()),
        }
    }

    pub fn refine_budget(&self) -> usize {
        self.refine.budget_words.unwrap_or(self.render.budget)
    }

    pub fn validate(&self) -> Result<()> {
        self.embedding.validate()?;
        self.implicit.validate()?;
        self.merge.validate()?;
        self.terms.validate()?;
        self.waypoints.validate()?;
        self.gists.validate()?;
        self.stitch.validate()?;
        self.render.validate()?;
        self.mining.validate()?;
        if self.refine.budget_words == Some(0) {
            bail!("refine.budget_words must be positive");
        }
        Ok(())
    }
}
