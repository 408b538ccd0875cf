use crate::state::{RunState, RunStatus, StageFailure, StageRecord};
use anyhow::Result;
use docustitch_sections::{Artifact, ArtifactStore, SelectionSource};
use docustitch_summary::Summary;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Row counts of the artifacts present on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub references: usize,
    pub explicit_edges: usize,
    pub implicit_edges: usize,
    pub merged_edges: usize,
    pub waypoints: usize,
    pub gists: usize,
    pub stitched_items: usize,
    pub rendered_blocks: usize,
    pub tokens_used: usize,
    pub budget: usize,
}

impl ReportCounts {
    pub async fn collect(store: &ArtifactStore) -> Result<Self> {
        let mut counts = Self {
            references: rows(store, Artifact::References).await?,
            explicit_edges: rows(store, Artifact::ExplicitEdges).await?,
            implicit_edges: rows(store, Artifact::ImplicitEdges).await?,
            merged_edges: rows(store, Artifact::MergedEdges).await?,
            waypoints: rows(store, Artifact::Waypoints).await?,
            gists: rows(store, Artifact::Gists).await?,
            stitched_items: rows(store, Artifact::Stitched).await?,
            ..Self::default()
        };
        if store.exists(Artifact::SummaryJson) {
            let summary: Summary = store.read_json(Artifact::SummaryJson).await?;
            counts.rendered_blocks = summary.blocks.len();
            counts.tokens_used = summary.tokens_used;
            counts.budget = summary.budget;
        }
        Ok(counts)
    }
}

async fn rows(store: &ArtifactStore, artifact: Artifact) -> Result<usize> {
    if !store.exists(artifact) {
        return Ok(0);
    }
    Ok(store.read_jsonl::<Value>(artifact).await?.len())
}

/// Contents of `report.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub doc_id: String,
    pub run_id: String,
    pub status: RunStatus,
    pub num_sections: usize,
    pub processing_time_ms: u64,
    pub selection: SelectionSource,
    pub counts: ReportCounts,
    pub stages: Vec<StageRecord>,
    pub failure: Option<StageFailure>,
}

impl RunReport {
    pub async fn build(state: &RunState, num_sections: usize, store: &ArtifactStore) -> Result<Self> {
        Ok(Self {
            doc_id: state.doc_id.clone(),
            run_id: state.run_id.clone(),
            status: state.status,
            num_sections,
            processing_time_ms: state.elapsed_ms(),
            selection: state.selection.clone(),
            counts: ReportCounts::collect(store).await?,
            stages: state.stages.clone(),
            failure: state.failure.clone(),
        })
    }

    pub async fn write(&self, store: &ArtifactStore) -> Result<()> {
        let path = store.write_json(Artifact::Report, self).await?;
        log::debug!("Wrote {}", path.display());
        Ok(())
    }
}
