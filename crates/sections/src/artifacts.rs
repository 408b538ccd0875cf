use crate::error::{Result, SectionsError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Persisted stage outputs of one document run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    References,
    ExplicitEdges,
    GraphNodes,
    GraphMetrics,
    Terms,
    Waypoints,
    Gists,
    ImplicitEdges,
    MergedEdges,
    MergedNodes,
    Stitched,
    SummaryText,
    SummaryJson,
    RefinedText,
    Report,
}

impl Artifact {
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::References => "refs.jsonl",
            Self::ExplicitEdges => "edges_explicit.jsonl",
            Self::GraphNodes => "graph_nodes.jsonl",
            Self::GraphMetrics => "graph_metrics.json",
            Self::Terms => "terms.jsonl",
            Self::Waypoints => "waypoints.jsonl",
            Self::Gists => "gists.jsonl",
            Self::ImplicitEdges => "edges_implicit.jsonl",
            Self::MergedEdges => "edges_merged.jsonl",
            Self::MergedNodes => "graph_merged.jsonl",
            Self::Stitched => "stitched.jsonl",
            Self::SummaryText => "summary.txt",
            Self::SummaryJson => "summary.json",
            Self::RefinedText => "summary_refined.txt",
            Self::Report => "report.json",
        }
    }
}

/// Per-document artifact namespace (`<base>/<doc_id>/`).
///
/// Writes go through a temp file and a rename, so a reader never observes a
/// half-written artifact. Reading an absent artifact is `MissingInput`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(base: impl AsRef<Path>, doc_id: &str) -> Self {
        Self {
            root: base.as_ref().join(doc_id),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.root.join(artifact.file_name())
    }

    #[must_use]
    pub fn exists(&self, artifact: Artifact) -> bool {
        self.path(artifact).exists()
    }

    pub async fn write_jsonl<T: Serialize>(&self, artifact: Artifact, rows: &[T]) -> Result<PathBuf> {
        let path = self.path(artifact);
        Self::write_jsonl_file(&path, rows).await?;
        Ok(path)
    }

    pub async fn read_jsonl<T: DeserializeOwned>(&self, artifact: Artifact) -> Result<Vec<T>> {
        Self::read_jsonl_file(self.path(artifact)).await
    }

    pub async fn write_json<T: Serialize>(&self, artifact: Artifact, value: &T) -> Result<PathBuf> {
        let path = self.path(artifact);
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&path, &bytes).await?;
        Ok(path)
    }

    pub async fn read_json<T: DeserializeOwned>(&self, artifact: Artifact) -> Result<T> {
        let bytes = read_required(&self.path(artifact)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn write_text(&self, artifact: Artifact, text: &str) -> Result<PathBuf> {
        let path = self.path(artifact);
        write_atomic(&path, text.as_bytes()).await?;
        Ok(path)
    }

    pub async fn read_text(&self, artifact: Artifact) -> Result<String> {
        let bytes = read_required(&self.path(artifact)).await?;
        String::from_utf8(bytes)
            .map_err(|e| SectionsError::Other(format!("{} is not UTF-8: {e}", artifact.file_name())))
    }

    /// Read one JSON value per non-blank line
    pub async fn read_jsonl_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
        let path = path.as_ref();
        let bytes = read_required(path).await?;
        let text = String::from_utf8_lossy(&bytes);

        let mut rows = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let row = serde_json::from_str(line).map_err(|source| SectionsError::MalformedRecord {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })?;
            rows.push(row);
        }
        Ok(rows)
    }

    pub async fn write_jsonl_file<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<()> {
        let mut buf = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buf, row)?;
            buf.push(b'\n');
        }
        write_atomic(path.as_ref(), &buf).await
    }
}

async fn read_required(path: &Path) -> Result<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(SectionsError::missing(path)),
        Err(err) => Err(err.into()),
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        sec_id: String,
        n: u32,
    }

    #[tokio::test]
    async fn jsonl_roundtrip_in_document_namespace() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path(), "cfr_6_37");
        let rows = vec![
            Row { sec_id: "§37.1".into(), n: 1 },
            Row { sec_id: "§37.3".into(), n: 2 },
        ];
        let path = store.write_jsonl(Artifact::Waypoints, &rows).await.unwrap();
        assert_eq!(path, tmp.path().join("cfr_6_37").join("waypoints.jsonl"));
        assert!(store.exists(Artifact::Waypoints));

        let loaded: Vec<Row> = store.read_jsonl(Artifact::Waypoints).await.unwrap();
        assert_eq!(loaded, rows);
    }

    #[tokio::test]
    async fn missing_artifact_is_reported() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path(), "doc");
        let err = store.read_jsonl::<Row>(Artifact::Gists).await.unwrap_err();
        assert!(err.is_missing_input());
        assert!(err.to_string().contains("gists.jsonl"));
    }

    #[tokio::test]
    async fn malformed_line_reports_position() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rows.jsonl");
        tokio::fs::write(&path, "{\"sec_id\":\"§1.1\",\"n\":1}\n\nnot json\n")
            .await
            .unwrap();
        let err = ArtifactStore::read_jsonl_file::<Row>(&path).await.unwrap_err();
        assert!(matches!(err, SectionsError::MalformedRecord { line: 3, .. }));
    }
}
