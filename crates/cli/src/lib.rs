use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use docustitch_citations::{compare_references, Reference, ReferenceAgreement};
use docustitch_sections::{document_ids, Artifact, ArtifactStore, Lexicon, SectionRecord};
use docustitch_summary::{LexiconMiner, MiningConfig, TermRecord};
use docustitch_vector_store::{EmbeddingMode, EmbeddingModel};
use flags::{EmbedModeFlag, QueriesFlag};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

pub mod config;
mod flags;
pub mod pipeline;
pub mod report;
pub mod state;

pub use config::{ExtractConfig, PipelineConfig, RefineConfig};
pub use pipeline::{DocumentRun, Pipeline};
pub use report::{ReportCounts, RunReport};
pub use state::{run_id, RunState, RunStatus, Stage, StageFailure, StageRecord, StageStatus};

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "docustitch")]
#[command(about = "Citation-aware stitched summaries of regulation parts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Embedding backend (overrides DOCUSTITCH_EMBEDDING_MODE and [embedding] mode)
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedModeFlag>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage for one or more documents
    Run(RunArgs),

    /// Extract citation references
    Refs(StageArgs),

    /// Build explicit edges from references
    Edges(StageArgs),

    /// Citation graph diagnostics
    Analyze(StageArgs),

    /// Per-section term tables
    Terms(StageArgs),

    /// Score sections and select waypoints
    Waypoints(StageArgs),

    /// Extract gists around waypoints
    Gists(StageArgs),

    /// Embedding-similarity edges
    Implicit(StageArgs),

    /// Merge explicit and implicit edges
    Merge(StageArgs),

    /// Order anchors and neighbours
    Stitch(StageArgs),

    /// Render the draft under the word budget
    Render(StageArgs),

    /// Refine the draft and enforce the word cap
    Refine(StageArgs),

    /// Rebuild report.json from the artifacts on disk
    Report(StageArgs),

    /// Mine a lexicon from the term tables of finished runs
    #[command(name = "mine-lexicon")]
    MineLexicon(MineLexiconArgs),

    /// Score one references file against another
    #[command(name = "compare-refs")]
    CompareRefs(CompareRefsArgs),
}

impl Commands {
    fn json_output(&self) -> bool {
        match self {
            Commands::Run(args) => args.input.json,
            Commands::MineLexicon(args) => args.json,
            Commands::CompareRefs(args) => args.json,
            Commands::Refs(args)
            | Commands::Edges(args)
            | Commands::Analyze(args)
            | Commands::Terms(args)
            | Commands::Waypoints(args)
            | Commands::Gists(args)
            | Commands::Implicit(args)
            | Commands::Merge(args)
            | Commands::Stitch(args)
            | Commands::Render(args)
            | Commands::Refine(args)
            | Commands::Report(args) => args.input.json,
        }
    }
}

#[derive(Args)]
struct InputArgs {
    /// Section records (JSONL, one section per line)
    #[arg(long)]
    sections: PathBuf,

    /// Artifact root; each document writes to <out>/<doc_id>/
    #[arg(long, default_value = "artifacts")]
    out: PathBuf,

    /// Pipeline configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Lexicon file (YAML, JSON or TOML)
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// Fail when the document id is absent instead of using the first document
    #[arg(long)]
    strict_doc: bool,

    /// Output JSON format
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    tuning: TuningArgs,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Documents to run (default: every document in the sections file)
    #[arg(long = "doc", value_delimiter = ',')]
    docs: Vec<String>,
}

#[derive(Args)]
struct StageArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Document id
    #[arg(long)]
    doc: String,
}

/// Flag overrides applied on top of the config file
#[derive(Args, Default)]
struct TuningArgs {
    /// Number of waypoints
    #[arg(long)]
    k: Option<usize>,

    /// Gist window around each waypoint
    #[arg(long)]
    window: Option<usize>,

    #[arg(long)]
    w_term: Option<f64>,

    #[arg(long)]
    w_lex: Option<f64>,

    #[arg(long)]
    w_central: Option<f64>,

    #[arg(long)]
    w_heading: Option<f64>,

    #[arg(long)]
    w_xref: Option<f64>,

    /// Sentences per gist
    #[arg(long)]
    k_sentences: Option<usize>,

    /// MMR relevance/diversity trade-off
    #[arg(long)]
    lambda: Option<f64>,

    /// Neighbours appended per anchor
    #[arg(long)]
    k_per_anchor: Option<usize>,

    /// Draft word budget
    #[arg(long)]
    budget: Option<usize>,

    /// Refined text word budget (default: the draft budget)
    #[arg(long)]
    refine_budget: Option<usize>,

    /// Implicit neighbours per query inside the window
    #[arg(long)]
    implicit_k: Option<usize>,

    #[arg(long)]
    min_sim: Option<f32>,

    #[arg(long)]
    implicit_window: Option<usize>,

    /// Implicit neighbours outside the window
    #[arg(long)]
    global_k: Option<usize>,

    /// Embed anchor gists as implicit queries
    #[arg(long)]
    use_gist: bool,

    /// Emit both directions of every implicit edge
    #[arg(long)]
    bidirectional: bool,

    #[arg(long, value_enum)]
    queries: Option<QueriesFlag>,

    /// Sentence model id for the onnx backend
    #[arg(long)]
    model: Option<String>,

    /// Directory holding <model>/model.onnx and <model>/tokenizer.json
    #[arg(long)]
    model_dir: Option<PathBuf>,

    #[arg(long)]
    w_explicit: Option<f32>,

    #[arg(long)]
    w_implicit: Option<f32>,

    /// Skip long-form citation enrichment
    #[arg(long)]
    no_enrich: bool,
}

impl TuningArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        fn set<T: Copy>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        let weights = &mut config.waypoints.weights;
        set(&mut weights.term, self.w_term);
        set(&mut weights.lexicon, self.w_lex);
        set(&mut weights.centrality, self.w_central);
        set(&mut weights.heading, self.w_heading);
        set(&mut weights.xref, self.w_xref);
        set(&mut config.waypoints.k, self.k);
        set(&mut config.waypoints.window, self.window);

        set(&mut config.gists.k_sentences, self.k_sentences);
        set(&mut config.gists.lambda, self.lambda);
        set(&mut config.stitch.k_per_anchor, self.k_per_anchor);
        set(&mut config.render.budget, self.budget);
        if self.refine_budget.is_some() {
            config.refine.budget_words = self.refine_budget;
        }

        set(&mut config.implicit.k, self.implicit_k);
        set(&mut config.implicit.min_sim, self.min_sim);
        set(&mut config.implicit.window, self.implicit_window);
        set(&mut config.implicit.global_k, self.global_k);
        set(
            &mut config.implicit.queries,
            self.queries.map(QueriesFlag::as_domain),
        );
        config.implicit.use_gist |= self.use_gist;
        if let Some(model) = &self.model {
            config.embedding.model.clone_from(model);
        }
        if self.model_dir.is_some() {
            config.embedding.model_dir.clone_from(&self.model_dir);
        }
        config.implicit.bidirectional |= self.bidirectional;

        set(&mut config.merge.w_explicit, self.w_explicit);
        set(&mut config.merge.w_implicit, self.w_implicit);
        if self.no_enrich {
            config.extract.enrich = false;
        }
    }
}

#[derive(Args)]
struct MineLexiconArgs {
    /// Artifact root holding <doc_id>/terms.jsonl
    #[arg(long, default_value = "artifacts")]
    out: PathBuf,

    /// Documents to mine (default: every document with a term table)
    #[arg(long = "doc", value_delimiter = ',')]
    docs: Vec<String>,

    /// Seed phrases, one per line
    #[arg(long)]
    seeds: Option<PathBuf>,

    /// Lexicon to write; the format follows the extension
    #[arg(long)]
    output: PathBuf,

    #[arg(long, default_value_t = 12)]
    top_per_doc: usize,

    #[arg(long, default_value_t = 1)]
    min_df: usize,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CompareRefsArgs {
    /// Reference file treated as ground truth (refs.jsonl)
    #[arg(long)]
    truth: PathBuf,

    /// Reference file under evaluation
    #[arg(long)]
    candidate: PathBuf,

    /// Write per-section rows here (JSONL)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON consumers
    if cli.command.json_output() {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let embed_mode = cli.embed_mode.map(EmbedModeFlag::as_domain);

    match cli.command {
        Commands::Run(args) => run_documents(args, embed_mode).await,
        Commands::MineLexicon(args) => run_mine_lexicon(args).await,
        Commands::CompareRefs(args) => run_compare_refs(args).await,
        Commands::Refs(args) => run_stage(Stage::Refs, args, embed_mode).await,
        Commands::Edges(args) => run_stage(Stage::Edges, args, embed_mode).await,
        Commands::Analyze(args) => run_stage(Stage::Analyze, args, embed_mode).await,
        Commands::Terms(args) => run_stage(Stage::Terms, args, embed_mode).await,
        Commands::Waypoints(args) => run_stage(Stage::Waypoints, args, embed_mode).await,
        Commands::Gists(args) => run_stage(Stage::Gists, args, embed_mode).await,
        Commands::Implicit(args) => run_stage(Stage::Implicit, args, embed_mode).await,
        Commands::Merge(args) => run_stage(Stage::Merge, args, embed_mode).await,
        Commands::Stitch(args) => run_stage(Stage::Stitch, args, embed_mode).await,
        Commands::Render(args) => run_stage(Stage::Render, args, embed_mode).await,
        Commands::Refine(args) => run_stage(Stage::Refine, args, embed_mode).await,
        Commands::Report(args) => run_stage(Stage::Report, args, embed_mode).await,
    }
}

async fn load_records(path: &Path) -> Result<Vec<SectionRecord>> {
    let records: Vec<SectionRecord> = ArtifactStore::read_jsonl_file(path)
        .await
        .with_context(|| format!("Failed to load sections from {}", path.display()))?;
    log::debug!("Loaded {} section records from {}", records.len(), path.display());
    Ok(records)
}

async fn build_pipeline(input: &InputArgs, embed_mode: Option<EmbeddingMode>) -> Result<Pipeline> {
    let mut config = PipelineConfig::load_or_default(input.config.as_deref()).await?;
    input.tuning.apply(&mut config);

    let lexicon = match &input.lexicon {
        Some(path) => Lexicon::load(path)
            .await
            .with_context(|| format!("Failed to load lexicon {}", path.display()))?,
        None => Lexicon::default(),
    };
    let model = match embed_mode {
        Some(mode) => EmbeddingModel::with_mode(mode, &config.embedding)?,
        None => EmbeddingModel::from_config(&config.embedding)?,
    };
    Pipeline::new(config, lexicon, model, &input.out)
}

/// Documents named on the command line, else every document in the file,
/// else one document named after the file
fn resolve_doc_ids(requested: &[String], records: &[SectionRecord], sections: &Path) -> Vec<String> {
    if !requested.is_empty() {
        return requested.to_vec();
    }
    let ids = document_ids(records);
    if !ids.is_empty() {
        return ids;
    }
    let stem = sections
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    vec![stem.to_string()]
}

#[derive(Serialize)]
struct DocumentOutcome {
    doc_id: String,
    status: RunStatus,
    run_id: Option<String>,
    artifacts: Option<PathBuf>,
    tokens_used: usize,
    budget: usize,
    error: Option<String>,
}

impl DocumentOutcome {
    fn from_report(report: &RunReport, artifacts: &Path) -> Self {
        Self {
            doc_id: report.doc_id.clone(),
            status: report.status,
            run_id: Some(report.run_id.clone()),
            artifacts: Some(artifacts.to_path_buf()),
            tokens_used: report.counts.tokens_used,
            budget: report.counts.budget,
            error: report.failure.as_ref().map(ToString::to_string),
        }
    }

    fn failed(doc_id: &str, error: String) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            status: RunStatus::Failed,
            run_id: None,
            artifacts: None,
            tokens_used: 0,
            budget: 0,
            error: Some(error),
        }
    }
}

#[derive(Serialize)]
struct RunOutput {
    documents: Vec<DocumentOutcome>,
    failed: usize,
}

async fn run_documents(args: RunArgs, embed_mode: Option<EmbeddingMode>) -> Result<()> {
    let records = load_records(&args.input.sections).await?;
    let pipeline = build_pipeline(&args.input, embed_mode).await?;
    let doc_ids = resolve_doc_ids(&args.docs, &records, &args.input.sections);

    let mut documents = Vec::with_capacity(doc_ids.len());
    for doc_id in &doc_ids {
        let outcome = match pipeline.open(records.clone(), doc_id, args.input.strict_doc) {
            Ok(doc) => match pipeline.run_document(&doc).await {
                Ok(report) => DocumentOutcome::from_report(&report, doc.store.root()),
                Err(err) => DocumentOutcome::failed(doc_id, format!("{err:#}")),
            },
            Err(err) => DocumentOutcome::failed(doc_id, format!("{err:#}")),
        };
        if let Some(error) = &outcome.error {
            log::error!("[{doc_id}] {error}");
        }
        documents.push(outcome);
    }

    let failed = documents
        .iter()
        .filter(|d| d.status != RunStatus::Completed)
        .count();
    let output = RunOutput { documents, failed };

    if args.input.json {
        print_stdout(&serde_json::to_string_pretty(&output)?)?;
    } else {
        for doc in &output.documents {
            match (&doc.run_id, &doc.artifacts) {
                (Some(run_id), Some(dir)) if doc.status == RunStatus::Completed => println!(
                    "{}: completed (run {}) {} / {} words -> {}",
                    doc.doc_id,
                    run_id,
                    doc.tokens_used,
                    doc.budget,
                    dir.display()
                ),
                _ => eprintln!(
                    "{}: failed: {}",
                    doc.doc_id,
                    doc.error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
    }

    if output.failed > 0 {
        eprintln!("{} of {} documents failed", output.failed, output.documents.len());
        std::process::exit(1);
    }
    Ok(())
}

async fn run_stage(stage: Stage, args: StageArgs, embed_mode: Option<EmbeddingMode>) -> Result<()> {
    let records = load_records(&args.input.sections).await?;
    let pipeline = build_pipeline(&args.input, embed_mode).await?;
    let doc = pipeline.open(records, &args.doc, args.input.strict_doc)?;

    let mut state = RunState::new(&doc.sections, doc.selection.clone());
    let result = pipeline.execute(stage, &doc, &mut state).await;
    state.complete();

    if args.input.json {
        print_stdout(&serde_json::to_string_pretty(&state)?)?;
    } else if let Some(record) = state.stages.last().filter(|_| result.is_ok()) {
        println!("{}: {}", record.stage, record.detail);
    }

    if let Err(failure) = result {
        eprintln!("Error: {failure}");
        std::process::exit(1);
    }
    Ok(())
}

/// Every document under `out` that has a term table, in name order
async fn discover_term_tables(out: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(out)
        .await
        .with_context(|| format!("Failed to read artifact root {}", out.display()))?;
    let mut docs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(ToString::to_string) else {
            continue;
        };
        if ArtifactStore::new(out, &name).exists(Artifact::Terms) {
            docs.push(name);
        }
    }
    docs.sort();
    Ok(docs)
}

async fn run_mine_lexicon(args: MineLexiconArgs) -> Result<()> {
    let config = MiningConfig {
        top_per_doc: args.top_per_doc,
        min_df: args.min_df,
    };
    config.validate()?;

    let doc_ids = if args.docs.is_empty() {
        discover_term_tables(&args.out).await?
    } else {
        args.docs.clone()
    };

    let mut documents: BTreeMap<String, Vec<TermRecord>> = BTreeMap::new();
    for doc_id in doc_ids {
        let terms = ArtifactStore::new(&args.out, &doc_id)
            .read_jsonl(Artifact::Terms)
            .await
            .with_context(|| format!("Failed to read term table of {doc_id}"))?;
        documents.insert(doc_id, terms);
    }

    let seeds: Vec<String> = match &args.seeds {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read seeds {}", path.display()))?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(ToString::to_string)
            .collect(),
        None => Vec::new(),
    };

    let lexicon = LexiconMiner::new(config).with_seeds(seeds).mine(&documents);
    lexicon
        .save(&args.output)
        .await
        .with_context(|| format!("Failed to write lexicon {}", args.output.display()))?;

    if args.json {
        print_stdout(&serde_json::to_string_pretty(&lexicon)?)?;
    } else {
        println!(
            "Wrote {} global terms for {} documents to {}",
            lexicon.global_terms.len(),
            lexicon.doc_specific.len(),
            args.output.display()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct CompareOutput {
    sections: Vec<ReferenceAgreement>,
    mean_precision: Option<f64>,
    mean_recall: Option<f64>,
    mean_f1: Option<f64>,
}

fn mean(rows: &[ReferenceAgreement], value: impl Fn(&ReferenceAgreement) -> f64) -> Option<f64> {
    if rows.is_empty() {
        return None;
    }
    let total: f64 = rows.iter().map(value).sum();
    Some((total / rows.len() as f64 * 1000.0).round() / 1000.0)
}

async fn run_compare_refs(args: CompareRefsArgs) -> Result<()> {
    let truth: Vec<Reference> = ArtifactStore::read_jsonl_file(&args.truth)
        .await
        .with_context(|| format!("Failed to read {}", args.truth.display()))?;
    let candidate: Vec<Reference> = ArtifactStore::read_jsonl_file(&args.candidate)
        .await
        .with_context(|| format!("Failed to read {}", args.candidate.display()))?;

    let sections = compare_references(&truth, &candidate);
    if let Some(path) = &args.output {
        ArtifactStore::write_jsonl_file(path, &sections).await?;
    }
    let output = CompareOutput {
        mean_precision: mean(&sections, |r| r.precision),
        mean_recall: mean(&sections, |r| r.recall),
        mean_f1: mean(&sections, |r| r.f1),
        sections,
    };

    if args.json {
        print_stdout(&serde_json::to_string_pretty(&output)?)?;
    } else {
        for row in &output.sections {
            println!(
                "{}\tP={:.3} R={:.3} F1={:.3} (+{} / -{})",
                row.sec_id, row.precision, row.recall, row.f1, row.only_candidate, row.only_truth
            );
        }
        println!(
            "mean F1 over {} sections: {}",
            output.sections.len(),
            output
                .mean_f1
                .map_or_else(|| "n/a".to_string(), |f1| format!("{f1:.3}"))
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn tuning_flags_override_config() {
        let tuning = TuningArgs {
            k: Some(3),
            lambda: Some(0.5),
            budget: Some(200),
            queries: Some(QueriesFlag::All),
            bidirectional: true,
            no_enrich: true,
            model: Some("sentence-transformers/all-MiniLM-L12-v2".to_string()),
            model_dir: Some(PathBuf::from("/srv/models")),
            ..TuningArgs::default()
        };
        let mut config = PipelineConfig::default();
        tuning.apply(&mut config);

        assert_eq!(config.waypoints.k, 3);
        assert!((config.gists.lambda - 0.5).abs() < 1e-12);
        assert_eq!(config.render.budget, 200);
        assert_eq!(config.refine_budget(), 200);
        assert_eq!(config.implicit.queries, docustitch_vector_store::QuerySet::All);
        assert!(config.implicit.bidirectional);
        assert!(!config.extract.enrich);
        assert_eq!(config.stitch.k_per_anchor, 3);
        assert_eq!(config.embedding.model, "sentence-transformers/all-MiniLM-L12-v2");
        assert_eq!(config.embedding.model_dir, Some(PathBuf::from("/srv/models")));
    }

    #[test]
    fn doc_ids_fall_back_to_file_stem() {
        let path = Path::new("data/cfr_6_37.jsonl");
        assert_eq!(resolve_doc_ids(&[], &[], path), vec!["cfr_6_37"]);
        assert_eq!(
            resolve_doc_ids(&["a".to_string()], &[], path),
            vec!["a"]
        );
    }
}
