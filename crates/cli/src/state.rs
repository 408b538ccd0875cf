use docustitch_sections::{SectionSet, SelectionSource};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Pipeline stages in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Refs,
    Edges,
    Analyze,
    Terms,
    Waypoints,
    Gists,
    Implicit,
    Merge,
    Stitch,
    Render,
    Refine,
    Report,
}

impl Stage {
    /// Stages executed by a full run; the report is written afterwards
    pub const PIPELINE: [Stage; 11] = [
        Stage::Refs,
        Stage::Edges,
        Stage::Analyze,
        Stage::Terms,
        Stage::Waypoints,
        Stage::Gists,
        Stage::Implicit,
        Stage::Merge,
        Stage::Stitch,
        Stage::Render,
        Stage::Refine,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Refs => "refs",
            Stage::Edges => "edges",
            Stage::Analyze => "analyze",
            Stage::Terms => "terms",
            Stage::Waypoints => "waypoints",
            Stage::Gists => "gists",
            Stage::Implicit => "implicit",
            Stage::Merge => "merge",
            Stage::Stitch => "stitch",
            Stage::Render => "render",
            Stage::Refine => "refine",
            Stage::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage error, tagged with the stage that raised it
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("stage '{stage}' failed: {message}")]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub elapsed_ms: u64,
    pub detail: String,
}

/// State of one document run, owned by the orchestrator for the run's lifetime
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub run_id: String,
    pub doc_id: String,
    pub status: RunStatus,
    pub stages: Vec<StageRecord>,
    pub selection: SelectionSource,
    pub failure: Option<StageFailure>,
    #[serde(skip)]
    started: Option<Instant>,
}

impl RunState {
    pub fn new(sections: &SectionSet, selection: SelectionSource) -> Self {
        Self {
            run_id: run_id(sections),
            doc_id: sections.doc_id().to_string(),
            status: RunStatus::Running,
            stages: Vec::new(),
            selection,
            failure: None,
            started: Some(Instant::now()),
        }
    }

    pub fn record_ok(&mut self, stage: Stage, elapsed_ms: u64, detail: impl Into<String>) {
        self.stages.push(StageRecord {
            stage,
            status: StageStatus::Ok,
            elapsed_ms,
            detail: detail.into(),
        });
    }

    pub fn record_failure(&mut self, failure: StageFailure, elapsed_ms: u64) {
        self.stages.push(StageRecord {
            stage: failure.stage,
            status: StageStatus::Failed,
            elapsed_ms,
            detail: failure.message.clone(),
        });
        self.status = RunStatus::Failed;
        self.failure = Some(failure);
    }

    pub fn complete(&mut self) {
        if self.status == RunStatus::Running {
            self.status = RunStatus::Completed;
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started
            .map_or(0, |t| u64::try_from(t.elapsed().as_millis()).unwrap_or(u64::MAX))
    }
}

/// First 16 hex chars of SHA-256 over the doc id, section ids and texts
pub fn run_id(sections: &SectionSet) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sections.doc_id().as_bytes());
    for section in sections.iter() {
        hasher.update(b"\x00");
        hasher.update(section.sec_id.as_bytes());
        hasher.update(b"\x00");
        hasher.update(section.text.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docustitch_sections::Section;

    fn sections(text: &str) -> SectionSet {
        SectionSet::new("cfr_6_37", vec![Section::new("cfr_6_37", "§37.1", "Scope", text)])
    }

    #[test]
    fn run_id_is_stable_and_content_addressed() {
        let a = run_id(&sections("Applies to States."));
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, run_id(&sections("Applies to States.")));
        assert_ne!(a, run_id(&sections("Applies to territories.")));
    }

    #[test]
    fn failure_marks_run_failed() {
        let mut state = RunState::new(&sections("x"), SelectionSource::Exact);
        state.record_ok(Stage::Refs, 1, "1 sections");
        state.record_failure(
            StageFailure {
                stage: Stage::Stitch,
                message: "Missing input: stitched.jsonl".into(),
            },
            2,
        );
        state.complete();
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.stages.len(), 2);
        assert_eq!(state.stages[1].status, StageStatus::Failed);
        assert_eq!(
            state.failure.as_ref().map(ToString::to_string).as_deref(),
            Some("stage 'stitch' failed: Missing input: stitched.jsonl")
        );
    }

    #[test]
    fn stage_names_are_kebab_case() {
        assert_eq!(serde_json::to_string(&Stage::Waypoints).unwrap(), "\"waypoints\"");
        assert_eq!(Stage::PIPELINE.len(), 11);
        assert_eq!(Stage::PIPELINE[10].to_string(), "refine");
    }
}
