use crate::config::PipelineConfig;
use crate::report::RunReport;
use crate::state::{RunState, Stage, StageFailure};
use anyhow::{bail, Context as AnyhowContext, Result};
use docustitch_citations::{build_explicit_edges_with, CfrCitationParser, Reference, ReferenceExtractor};
use docustitch_graph::{Edge, GraphAnalyzer, GraphMerger, GraphNode, MergedGraph};
use docustitch_sections::{
    part_prefix, select_document, Artifact, ArtifactStore, Lexicon, SectionRecord, SectionSet,
    SelectionSource,
};
use docustitch_summary::{
    build_refine_context, refine_draft, Gist, GistBuilder, PassthroughRefiner, RefineRequest,
    Refiner, Renderer, SalienceInputs, StitchedItem, Stitcher, Summary, TermExtractor, TermRecord,
    Waypoint, WaypointScorer,
};
use docustitch_vector_store::{EmbeddingModel, ImplicitEdgeBuilder, QuerySet};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// One document's sections and artifact namespace
pub struct DocumentRun {
    pub sections: SectionSet,
    pub store: ArtifactStore,
    pub selection: SelectionSource,
}

impl DocumentRun {
    pub fn doc_id(&self) -> &str {
        self.sections.doc_id()
    }
}

/// Runs stages against a document's artifact namespace.
///
/// Every stage reads its upstream artifacts from disk and writes its own
/// output before returning, so any stage can be re-run on its own.
pub struct Pipeline {
    config: PipelineConfig,
    lexicon: Lexicon,
    model: EmbeddingModel,
    refiner: Box<dyn Refiner>,
    out_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        lexicon: Lexicon,
        model: EmbeddingModel,
        out_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate().context("Invalid pipeline configuration")?;
        lexicon.validate()?;
        Ok(Self {
            config,
            lexicon,
            model,
            refiner: Box::new(PassthroughRefiner),
            out_dir: out_dir.into(),
        })
    }

    pub fn with_refiner(mut self, refiner: impl Refiner + 'static) -> Self {
        self.refiner = Box::new(refiner);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Select `doc_id` from the records; `strict` forbids the first-document fallback
    pub fn open(&self, records: Vec<SectionRecord>, doc_id: &str, strict: bool) -> Result<DocumentRun> {
        let selection = select_document(records, doc_id)?;
        if strict && selection.is_fallback() {
            bail!("Document '{doc_id}' not found in sections file (--strict-doc)");
        }
        Ok(DocumentRun {
            store: ArtifactStore::new(&self.out_dir, doc_id),
            sections: selection.sections,
            selection: selection.source,
        })
    }

    /// Every stage in order, stopping at the first failure. The report is
    /// written either way; artifacts of finished stages stay on disk.
    pub async fn run_document(&self, doc: &DocumentRun) -> Result<RunReport> {
        let mut state = RunState::new(&doc.sections, doc.selection.clone());
        log::info!(
            "[{}] run {} over {} sections",
            doc.doc_id(),
            state.run_id,
            doc.sections.len()
        );

        for stage in Stage::PIPELINE {
            if let Err(failure) = self.execute(stage, doc, &mut state).await {
                log::error!("[{}] {failure}", doc.doc_id());
                break;
            }
        }
        state.complete();

        let report = RunReport::build(&state, doc.sections.len(), &doc.store)
            .await
            .context("Failed to assemble run report")?;
        report
            .write(&doc.store)
            .await
            .context("Failed to write run report")?;
        Ok(report)
    }

    /// Run one stage and record its outcome in `state`
    pub async fn execute(
        &self,
        stage: Stage,
        doc: &DocumentRun,
        state: &mut RunState,
    ) -> std::result::Result<(), StageFailure> {
        let started = Instant::now();
        let outcome = self.run_stage(stage, doc).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(detail) => {
                log::info!("[{}] {stage}: {detail} ({elapsed_ms} ms)", doc.doc_id());
                state.record_ok(stage, elapsed_ms, detail);
                Ok(())
            }
            Err(err) => {
                let failure = StageFailure {
                    stage,
                    message: format!("{err:#}"),
                };
                state.record_failure(failure.clone(), elapsed_ms);
                Err(failure)
            }
        }
    }

    async fn run_stage(&self, stage: Stage, doc: &DocumentRun) -> Result<String> {
        match stage {
            Stage::Refs => self.extract_references(doc).await,
            Stage::Edges => self.explicit_edges(doc).await,
            Stage::Analyze => self.analyze(doc).await,
            Stage::Terms => self.terms(doc).await,
            Stage::Waypoints => self.waypoints(doc).await,
            Stage::Gists => self.gists(doc).await,
            Stage::Implicit => self.implicit_edges(doc).await,
            Stage::Merge => self.merge(doc).await,
            Stage::Stitch => self.stitch(doc).await,
            Stage::Render => self.render(doc).await,
            Stage::Refine => self.refine(doc).await,
            Stage::Report => {
                let state = RunState::new(&doc.sections, doc.selection.clone());
                let report = RunReport::build(&state, doc.sections.len(), &doc.store).await?;
                report.write(&doc.store).await?;
                Ok(format!("{} merged edges on record", report.counts.merged_edges))
            }
        }
    }

    async fn extract_references(&self, doc: &DocumentRun) -> Result<String> {
        let extractor = if self.config.extract.enrich {
            ReferenceExtractor::new().with_enricher(CfrCitationParser::new())
        } else {
            ReferenceExtractor::new()
        };
        let refs = extractor.extract_all(&doc.sections);
        doc.store.write_jsonl(Artifact::References, &refs).await?;
        let tokens: usize = refs.iter().map(|r| r.explicit_refs.len()).sum();
        Ok(format!("{tokens} citation tokens in {} sections", refs.len()))
    }

    async fn explicit_edges(&self, doc: &DocumentRun) -> Result<String> {
        let refs: Vec<Reference> = doc.store.read_jsonl(Artifact::References).await?;
        let edges =
            build_explicit_edges_with(&doc.sections, &refs, self.config.extract.edge_options());
        doc.store.write_jsonl(Artifact::ExplicitEdges, &edges).await?;
        Ok(format!("{} explicit edges", edges.len()))
    }

    async fn analyze(&self, doc: &DocumentRun) -> Result<String> {
        let edges: Vec<Edge> = doc.store.read_jsonl(Artifact::ExplicitEdges).await?;
        let analysis = GraphAnalyzer::new().analyze(&doc.sections, &edges);
        doc.store.write_jsonl(Artifact::GraphNodes, &analysis.nodes).await?;
        doc.store
            .write_json(Artifact::GraphMetrics, &analysis.metrics)
            .await?;
        Ok(format!(
            "{} nodes, {} edges, {} components",
            analysis.metrics.num_nodes, analysis.metrics.num_edges, analysis.metrics.components
        ))
    }

    async fn terms(&self, doc: &DocumentRun) -> Result<String> {
        let records = TermExtractor::new(self.config.terms.clone()).extract(&doc.sections);
        doc.store.write_jsonl(Artifact::Terms, &records).await?;
        Ok(format!("term tables for {} sections", records.len()))
    }

    async fn waypoints(&self, doc: &DocumentRun) -> Result<String> {
        let terms: Vec<TermRecord> = doc.store.read_jsonl(Artifact::Terms).await?;
        let references: Vec<Reference> = doc.store.read_jsonl(Artifact::References).await?;
        let explicit_edges: Vec<Edge> = doc.store.read_jsonl(Artifact::ExplicitEdges).await?;
        let inputs = SalienceInputs {
            terms: &terms,
            references: &references,
            explicit_edges: &explicit_edges,
            lexicon: &self.lexicon,
        };
        let waypoints = WaypointScorer::new(self.config.waypoints.clone()).score(&doc.sections, inputs)?;
        doc.store.write_jsonl(Artifact::Waypoints, &waypoints).await?;
        Ok(format!("{} waypoints", waypoints.len()))
    }

    async fn gists(&self, doc: &DocumentRun) -> Result<String> {
        let waypoints: Vec<Waypoint> = doc.store.read_jsonl(Artifact::Waypoints).await?;
        let gists = GistBuilder::new(self.config.gists).build(&doc.sections, &waypoints);
        doc.store.write_jsonl(Artifact::Gists, &gists).await?;
        Ok(format!("{} gists", gists.len()))
    }

    async fn implicit_edges(&self, doc: &DocumentRun) -> Result<String> {
        let config = self.config.implicit.clone();
        let anchors: Vec<String> = match config.queries {
            QuerySet::Anchors => doc
                .store
                .read_jsonl::<Waypoint>(Artifact::Waypoints)
                .await?
                .into_iter()
                .map(|w| w.sec_id)
                .collect(),
            QuerySet::All => Vec::new(),
        };
        let gists: HashMap<String, String> = if config.use_gist {
            doc.store
                .read_jsonl::<Gist>(Artifact::Gists)
                .await?
                .into_iter()
                .map(|g| (g.anchor_sec_id, g.gist_text))
                .collect()
        } else {
            HashMap::new()
        };

        let edges = ImplicitEdgeBuilder::new(config, &self.model)
            .build(&doc.sections, &anchors, &gists)
            .await?;
        doc.store.write_jsonl(Artifact::ImplicitEdges, &edges).await?;
        Ok(format!(
            "{} implicit edges ({} embeddings)",
            edges.len(),
            self.model.mode().as_str()
        ))
    }

    async fn merge(&self, doc: &DocumentRun) -> Result<String> {
        let explicit: Vec<Edge> = doc.store.read_jsonl(Artifact::ExplicitEdges).await?;
        let implicit: Vec<Edge> = doc.store.read_jsonl(Artifact::ImplicitEdges).await?;
        let merged = GraphMerger::new(self.config.merge).merge(&doc.sections, &explicit, &implicit);
        let (nodes, edges) = merged.into_parts();
        doc.store.write_jsonl(Artifact::MergedEdges, &edges).await?;
        doc.store.write_jsonl(Artifact::MergedNodes, &nodes).await?;
        Ok(format!("{} merged edges over {} nodes", edges.len(), nodes.len()))
    }

    async fn stitch(&self, doc: &DocumentRun) -> Result<String> {
        let nodes: Vec<GraphNode> = doc.store.read_jsonl(Artifact::MergedNodes).await?;
        let edges: Vec<Edge> = doc.store.read_jsonl(Artifact::MergedEdges).await?;
        let waypoints: Vec<Waypoint> = doc.store.read_jsonl(Artifact::Waypoints).await?;
        let graph = MergedGraph::new(nodes, edges);
        let plan = Stitcher::new(self.config.stitch).stitch(&waypoints, &graph);
        doc.store.write_jsonl(Artifact::Stitched, &plan).await?;
        Ok(format!("{} stitched items", plan.len()))
    }

    async fn render(&self, doc: &DocumentRun) -> Result<String> {
        let gists: Vec<Gist> = doc.store.read_jsonl(Artifact::Gists).await?;
        let plan: Vec<StitchedItem> = doc.store.read_jsonl(Artifact::Stitched).await?;
        let summary = Renderer::new(self.config.render).render(&doc.sections, &gists, &plan);
        doc.store
            .write_text(Artifact::SummaryText, &summary.to_text())
            .await?;
        doc.store.write_json(Artifact::SummaryJson, &summary).await?;
        Ok(format!(
            "{} blocks, {} / {} words",
            summary.blocks.len(),
            summary.tokens_used,
            summary.budget
        ))
    }

    async fn refine(&self, doc: &DocumentRun) -> Result<String> {
        let draft = doc.store.read_text(Artifact::SummaryText).await?;
        let plan: Vec<StitchedItem> = doc.store.read_jsonl(Artifact::Stitched).await?;
        let gists: Vec<Gist> = doc.store.read_jsonl(Artifact::Gists).await?;

        let context = doc
            .sections
            .iter()
            .find_map(|s| part_prefix(&s.sec_id))
            .map(|part| build_refine_context(part, &plan, &doc.sections, &gists))
            .unwrap_or_default();
        let request = RefineRequest {
            doc_id: doc.doc_id().to_string(),
            draft,
            context,
            budget_words: self.config.refine_budget(),
        };
        let refined = refine_draft(self.refiner.as_ref(), &request)?;
        doc.store.write_text(Artifact::RefinedText, &refined).await?;
        Ok(format!(
            "{} words via '{}'",
            refined.split_whitespace().count(),
            self.refiner.name()
        ))
    }
}

/// Rendered summary of a finished run, if the render stage produced one
pub async fn read_summary(store: &ArtifactStore) -> Result<Option<Summary>> {
    if !store.exists(Artifact::SummaryJson) {
        return Ok(None);
    }
    Ok(Some(store.read_json(Artifact::SummaryJson).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RunStatus, StageStatus};
    use docustitch_vector_store::DEFAULT_DIMENSION;
    use tempfile::TempDir;

    fn record(doc: &str, sec: &str, heading: &str, text: &str) -> SectionRecord {
        SectionRecord {
            doc_id: Some(doc.into()),
            sec_id: Some(sec.into()),
            heading: Some(heading.into()),
            text: Some(text.into()),
            ..SectionRecord::default()
        }
    }

    fn records() -> Vec<SectionRecord> {
        vec![
            record("cfr_6_37", "§ 37.1", "Applicability", "This part applies to States issuing driver licenses. See § 37.3."),
            record("cfr_6_37", "§37.2", "Definitions", "Card means an identification card. License means a driver license."),
            record("cfr_6_37", "§37.3", "Verification", "States must verify documents under §§ 37.1-37.2. Records are kept."),
        ]
    }

    fn pipeline(out: &Path) -> Pipeline {
        Pipeline::new(
            PipelineConfig::default(),
            Lexicon::default(),
            EmbeddingModel::stub(DEFAULT_DIMENSION),
            out,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn full_run_writes_every_artifact() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let doc = pipeline.open(records(), "cfr_6_37", true).unwrap();

        let report = pipeline.run_document(&doc).await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.num_sections, 3);
        assert_eq!(report.stages.len(), Stage::PIPELINE.len());
        assert!(report.stages.iter().all(|s| s.status == StageStatus::Ok));
        assert!(report.counts.explicit_edges >= 1);
        assert!(report.counts.tokens_used <= report.counts.budget);

        for artifact in [
            Artifact::References,
            Artifact::GraphMetrics,
            Artifact::Stitched,
            Artifact::SummaryText,
            Artifact::RefinedText,
            Artifact::Report,
        ] {
            assert!(doc.store.exists(artifact), "{}", artifact.file_name());
        }
        let summary = read_summary(&doc.store).await.unwrap().unwrap();
        assert_eq!(summary.tokens_used, report.counts.tokens_used);
    }

    #[tokio::test]
    async fn stage_without_upstream_reports_missing_input() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let doc = pipeline.open(records(), "cfr_6_37", false).unwrap();
        let mut state = RunState::new(&doc.sections, doc.selection.clone());

        let failure = pipeline.execute(Stage::Stitch, &doc, &mut state).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Stitch);
        assert!(failure.message.contains("Missing input"), "{}", failure.message);
        assert_eq!(state.status, RunStatus::Failed);
        assert!(!doc.store.exists(Artifact::Stitched));
    }

    #[tokio::test]
    async fn strict_selection_rejects_fallback() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        assert!(pipeline.open(records(), "cfr_6_115", true).is_err());

        let doc = pipeline.open(records(), "cfr_6_115", false).unwrap();
        assert_eq!(
            doc.selection,
            SelectionSource::FirstAvailable {
                doc_id: "cfr_6_37".into()
            }
        );
        assert_eq!(doc.sections.len(), 3);
    }

    #[tokio::test]
    async fn empty_document_completes_with_empty_outputs() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let doc = pipeline.open(Vec::new(), "empty", true).unwrap();

        let report = pipeline.run_document(&doc).await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.counts.waypoints, 0);
        assert_eq!(report.counts.merged_edges, 0);
        assert_eq!(report.counts.tokens_used, 0);
    }
}
