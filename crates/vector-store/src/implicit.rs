use crate::embeddings::EmbeddingModel;
use crate::error::{Result, VectorStoreError};
use crate::index::VectorIndex;
use docustitch_graph::{Edge, EdgeMethod};
use docustitch_sections::{clean_text, normalize_sec_id, SectionSet};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which sections issue similarity queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuerySet {
    /// Waypoint anchors only
    #[default]
    Anchors,

    /// Every section
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplicitConfig {
    /// Top-k neighbours inside the window
    pub k: usize,
    pub min_sim: f32,

    /// ± positions around the query section
    pub window: usize,

    /// Extra neighbours outside the window; 0 disables
    pub global_k: usize,

    /// Embed the anchor's gist as the query when one exists
    pub use_gist: bool,

    /// Also emit the reverse of every edge
    pub bidirectional: bool,

    pub queries: QuerySet,

    /// Section text is truncated to this many characters before embedding
    pub max_chars: usize,
}

impl Default for ImplicitConfig {
    fn default() -> Self {
        Self {
            k: 5,
            min_sim: 0.35,
            window: 1,
            global_k: 0,
            use_gist: false,
            bidirectional: false,
            queries: QuerySet::Anchors,
            max_chars: 8000,
        }
    }
}

impl ImplicitConfig {
    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.min_sim) {
            return Err(VectorStoreError::InvalidConfig(format!(
                "min_sim must be within [-1, 1], got {}",
                self.min_sim
            )));
        }
        if self.max_chars == 0 {
            return Err(VectorStoreError::InvalidConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn section_document(heading: &str, text: &str, max_chars: usize) -> String {
    let joined = format!("{}\n{}", clean_text(heading), clean_text(text));
    joined.trim().chars().take(max_chars).collect()
}

/// Nearest-neighbour edges between semantically related sections.
///
/// Window search always runs before global search, and the first edge seen
/// for a `(src, dst)` pair wins. A query that finds nothing above `min_sim`
/// simply contributes no edges.
pub struct ImplicitEdgeBuilder<'a> {
    config: ImplicitConfig,
    model: &'a EmbeddingModel,
}

struct EdgeSink {
    edges: Vec<Edge>,
    seen: HashSet<(usize, usize)>,
    bidirectional: bool,
}

impl EdgeSink {
    fn push(&mut self, sections: &SectionSet, src: usize, dst: usize, score: f32, method: EdgeMethod) {
        let ids = sections.sections();
        if self.seen.insert((src, dst)) {
            self.edges.push(Edge::implicit(
                ids[src].sec_id.clone(),
                ids[dst].sec_id.clone(),
                method,
                score,
            ));
            if self.bidirectional && self.seen.insert((dst, src)) {
                self.edges.push(Edge::implicit(
                    ids[dst].sec_id.clone(),
                    ids[src].sec_id.clone(),
                    method.reversed(),
                    score,
                ));
            }
        }
    }
}

impl<'a> ImplicitEdgeBuilder<'a> {
    pub fn new(config: ImplicitConfig, model: &'a EmbeddingModel) -> Self {
        Self { config, model }
    }

    /// Build edges for the configured query set.
    ///
    /// `anchors` are waypoint ids in score order; `gists` maps anchor ids to
    /// gist text and is only consulted when `use_gist` is set.
    pub async fn build(
        &self,
        sections: &SectionSet,
        anchors: &[String],
        gists: &HashMap<String, String>,
    ) -> Result<Vec<Edge>> {
        let n = sections.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let documents: Vec<String> = sections
            .iter()
            .map(|s| section_document(&s.heading, &s.text, self.config.max_chars))
            .collect();
        let vectors = self
            .model
            .embed_batch(documents.iter().map(String::as_str).collect())
            .await?;
        let index = VectorIndex::from_vectors(&vectors, self.model.dimension())?;

        let query_ids: Vec<usize> = match self.config.queries {
            QuerySet::All => (0..n).collect(),
            QuerySet::Anchors => {
                let mut seen = HashSet::new();
                anchors
                    .iter()
                    .filter_map(|a| sections.position(&normalize_sec_id(a)))
                    .filter(|&i| seen.insert(i))
                    .collect()
            }
        };

        let mut query_vectors: HashMap<usize, Vec<f32>> = HashMap::new();
        if self.config.use_gist {
            let mut order = Vec::new();
            let mut texts = Vec::new();
            for &i in &query_ids {
                let gist = gists
                    .get(&sections.sections()[i].sec_id)
                    .map(|g| clean_text(g))
                    .filter(|g| !g.is_empty());
                if let Some(gist) = gist {
                    order.push(i);
                    texts.push(gist);
                }
            }
            let embedded = self
                .model
                .embed_batch(texts.iter().map(String::as_str).collect())
                .await?;
            query_vectors.extend(order.into_iter().zip(embedded));
        }

        let mut sink = EdgeSink {
            edges: Vec::new(),
            seen: HashSet::new(),
            bidirectional: self.config.bidirectional,
        };

        for &qi in &query_ids {
            let query: Vec<f32> = match query_vectors.get(&qi) {
                Some(v) => v.clone(),
                None => vectors[qi].clone(),
            };
            let lo = qi.saturating_sub(self.config.window);
            let hi = qi.saturating_add(self.config.window).min(n - 1);

            let window: Vec<usize> = (lo..=hi).filter(|&i| i != qi).collect();
            for (dst, score) in index.top_k(&query, &window, self.config.k)? {
                if score >= self.config.min_sim {
                    sink.push(sections, qi, dst, score, EdgeMethod::ImplicitKnnWindow);
                }
            }

            if self.config.global_k > 0 {
                let far: Vec<usize> = (0..n).filter(|&i| (i < lo || i > hi) && i != qi).collect();
                for (dst, score) in index.top_k(&query, &far, self.config.global_k)? {
                    if score >= self.config.min_sim {
                        sink.push(sections, qi, dst, score, EdgeMethod::ImplicitKnnGlobal);
                    }
                }
            }
        }

        log::info!(
            "Built {} implicit edges from {} queries ({} mode)",
            sink.edges.len(),
            query_ids.len(),
            self.model.mode().as_str()
        );
        Ok(sink.edges)
    }
}
