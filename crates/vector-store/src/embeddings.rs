use crate::error::{Result, VectorStoreError};
#[cfg(feature = "onnx")]
use crate::onnx::LazyOnnx;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
#[cfg(feature = "onnx")]
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::spawn_blocking;

/// Vector length of the default sentence model and the offline backends
pub const DEFAULT_DIMENSION: usize = 384;

/// Sentence model looked up under the model directory
pub const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

const MODE_ENV: &str = "DOCUSTITCH_EMBEDDING_MODE";
const MODEL_DIR_ENV: &str = "DOCUSTITCH_MODEL_DIR";

/// Batches at least this large are hashed on the blocking pool
const BLOCKING_BATCH: usize = 64;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    /// Sentence-transformer ONNX export run through onnxruntime
    #[default]
    Onnx,

    /// Signed feature hashing of words and word bigrams (offline, lexical only)
    Hashed,

    /// Text-seeded pseudo-random unit vectors (tests)
    Stub,
}

impl EmbeddingMode {
    /// `DOCUSTITCH_EMBEDDING_MODE` when set, else `fallback`
    pub fn from_env_or(fallback: Self) -> Result<Self> {
        match env::var(MODE_ENV) {
            Ok(raw) => Self::parse(&raw),
            Err(_) => Ok(fallback),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_env_or(Self::default())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "hashed" => Ok(Self::Hashed),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::EmbeddingError(format!(
                "Unsupported {MODE_ENV} '{other}' (expected 'onnx', 'hashed' or 'stub')"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Onnx => "onnx",
            Self::Hashed => "hashed",
            Self::Stub => "stub",
        }
    }
}

/// Which embedding backend to build and where its model lives.
///
/// The ONNX backend expects `<model_dir>/<model>/model.onnx` (or
/// `onnx/model.onnx`, the Hugging Face export layout) next to
/// `<model_dir>/<model>/tokenizer.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend; `DOCUSTITCH_EMBEDDING_MODE` takes precedence when set
    pub mode: Option<EmbeddingMode>,

    /// Model id, e.g. `all-minilm-l6-v2` or `sentence-transformers/all-MiniLM-L6-v2`
    pub model: String,

    /// Model root; `DOCUSTITCH_MODEL_DIR`, then `./models` when unset
    pub model_dir: Option<PathBuf>,

    pub dimension: usize,

    /// Tokens kept per text before truncation
    pub max_length: usize,

    /// Texts per forward pass
    pub max_batch: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: None,
            model: DEFAULT_MODEL.to_string(),
            model_dir: None,
            dimension: DEFAULT_DIMENSION,
            max_length: 256,
            max_batch: 32,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(VectorStoreError::InvalidConfig(
                "embedding.model must not be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("dimension", self.dimension),
            ("max_length", self.max_length),
            ("max_batch", self.max_batch),
        ] {
            if value == 0 {
                return Err(VectorStoreError::InvalidConfig(format!(
                    "embedding.{name} must be positive"
                )));
            }
        }
        Ok(())
    }

    /// Configured directory, else `DOCUSTITCH_MODEL_DIR`, else `./models`
    #[must_use]
    pub fn resolved_model_dir(&self) -> PathBuf {
        self.model_dir
            .clone()
            .or_else(|| env::var_os(MODEL_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("models"))
    }
}

struct StubBackend {
    dimension: usize,
    #[cfg(test)]
    batch_calls: AtomicUsize,
}

impl StubBackend {
    #[cfg(not(test))]
    const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    #[cfg(test)]
    const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            batch_calls: AtomicUsize::new(0),
        }
    }

    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        #[cfg(test)]
        self.batch_calls.fetch_add(1, Ordering::Relaxed);
        texts.iter().map(|t| stub_embed(t, self.dimension)).collect()
    }
}

enum Backend {
    #[cfg(feature = "onnx")]
    Onnx(Arc<LazyOnnx>),
    Hashed,
    Stub(StubBackend),
}

/// Maps text to unit-norm vectors; cosine similarity is a dot product
pub struct EmbeddingModel {
    mode: EmbeddingMode,
    dimension: usize,
    backend: Backend,
}

impl EmbeddingModel {
    /// Default config, mode from `DOCUSTITCH_EMBEDDING_MODE`
    pub fn new() -> Result<Self> {
        Self::from_config(&EmbeddingConfig::default())
    }

    /// Mode from `DOCUSTITCH_EMBEDDING_MODE`, else `config.mode`, else ONNX
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let mode = EmbeddingMode::from_env_or(config.mode.unwrap_or_default())?;
        Self::with_mode(mode, config)
    }

    /// Build `mode` regardless of the environment. ONNX assets are loaded on
    /// the first embedding call, so stages that never embed need no model.
    pub fn with_mode(mode: EmbeddingMode, config: &EmbeddingConfig) -> Result<Self> {
        config.validate()?;
        let backend = match mode {
            EmbeddingMode::Onnx => onnx_backend(config)?,
            EmbeddingMode::Hashed => Backend::Hashed,
            EmbeddingMode::Stub => Backend::Stub(StubBackend::new(config.dimension)),
        };
        Ok(Self {
            mode,
            dimension: config.dimension,
            backend,
        })
    }

    #[must_use]
    pub const fn hashed(dimension: usize) -> Self {
        Self {
            mode: EmbeddingMode::Hashed,
            dimension,
            backend: Backend::Hashed,
        }
    }

    #[must_use]
    pub const fn stub(dimension: usize) -> Self {
        Self {
            mode: EmbeddingMode::Stub,
            dimension,
            backend: Backend::Stub(StubBackend::new(dimension)),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> EmbeddingMode {
        self.mode
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[cfg(test)]
    pub(crate) fn stub_batch_calls(&self) -> Option<usize> {
        match &self.backend {
            Backend::Stub(stub) => Some(stub.batch_calls.load(Ordering::Relaxed)),
            _ => None,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(vec![text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }

    pub async fn embed_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let owned: Vec<String> = texts.into_iter().map(ToString::to_string).collect();
        match &self.backend {
            Backend::Stub(stub) => Ok(stub.embed_batch(&owned)),
            Backend::Hashed if owned.len() < BLOCKING_BATCH => Ok(owned
                .iter()
                .map(|t| hashed_embed(t, self.dimension))
                .collect()),
            Backend::Hashed => {
                let dimension = self.dimension;
                spawn_blocking(move || {
                    owned
                        .iter()
                        .map(|t| hashed_embed(t, dimension))
                        .collect::<Vec<_>>()
                })
                .await
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Join error: {e}")))
            }
            #[cfg(feature = "onnx")]
            Backend::Onnx(onnx) => {
                let onnx = Arc::clone(onnx);
                spawn_blocking(move || onnx.embed_blocking(&owned))
                    .await
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("Join error: {e}")))?
            }
        }
    }

    #[must_use]
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[cfg(feature = "onnx")]
fn onnx_backend(config: &EmbeddingConfig) -> Result<Backend> {
    Ok(Backend::Onnx(Arc::new(LazyOnnx::new(config))))
}

#[cfg(not(feature = "onnx"))]
fn onnx_backend(_config: &EmbeddingConfig) -> Result<Backend> {
    Err(VectorStoreError::EmbeddingError(
        "Built without the `onnx` feature; use --embed-mode hashed or rebuild with --features onnx"
            .to_string(),
    ))
}

pub(crate) fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

/// Signed feature hashing over lowercased words and adjacent word pairs,
/// log-scaled counts, L2-normalized. Text without words maps to the zero
/// vector.
fn hashed_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dimension];
    if dimension == 0 {
        return vec;
    }

    let tokens = docustitch_sections::words(text);
    let mut counts: BTreeMap<u64, u32> = BTreeMap::new();
    for token in &tokens {
        *counts.entry(fnv1a_64(token.as_bytes())).or_default() += 1;
    }
    for pair in tokens.windows(2) {
        let joined = format!("{} {}", pair[0], pair[1]);
        *counts.entry(fnv1a_64(joined.as_bytes())).or_default() += 1;
    }

    for (hash, count) in counts {
        let mut state = hash;
        let mixed = splitmix64(&mut state);
        let bucket = (mixed % dimension as u64) as usize;
        let sign = if mixed >> 63 == 0 { 1.0 } else { -1.0 };
        vec[bucket] += sign * (1.0 + (count as f32).ln());
    }
    normalize(&mut vec);
    vec
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(EmbeddingMode::parse("HASHED").unwrap(), EmbeddingMode::Hashed);
        assert_eq!(EmbeddingMode::parse(" stub ").unwrap(), EmbeddingMode::Stub);
        assert_eq!(EmbeddingMode::parse("onnx").unwrap(), EmbeddingMode::Onnx);
        assert_eq!(EmbeddingMode::default(), EmbeddingMode::Onnx);
        assert!(EmbeddingMode::parse("openai").is_err());
    }

    #[test]
    fn config_rejects_zero_sizes() {
        assert!(EmbeddingConfig::default().validate().is_ok());

        let config = EmbeddingConfig {
            max_batch: 0,
            ..EmbeddingConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EmbeddingConfig {
            model: "  ".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(EmbeddingModel::with_mode(EmbeddingMode::Hashed, &config).is_err());
    }

    #[test]
    fn explicit_model_dir_wins() {
        let config = EmbeddingConfig {
            model_dir: Some(PathBuf::from("/opt/models")),
            ..EmbeddingConfig::default()
        };
        assert_eq!(config.resolved_model_dir(), PathBuf::from("/opt/models"));
    }

    #[tokio::test]
    async fn hashed_vectors_are_unit_norm_and_deterministic() {
        let model = EmbeddingModel::hashed(64);
        let a = model.embed("Applicants must present a valid REAL ID card.").await.unwrap();
        let b = model.embed("Applicants must present a valid REAL ID card.").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((norm(&a) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hashed_similarity_tracks_word_overlap() {
        let model = EmbeddingModel::hashed(DEFAULT_DIMENSION);
        let vecs = model
            .embed_batch(vec![
                "state driver license issuance requirements",
                "driver license issuance requirements for states",
                "marine fisheries quota allocation",
            ])
            .await
            .unwrap();
        let close = EmbeddingModel::cosine_similarity(&vecs[0], &vecs[1]);
        let far = EmbeddingModel::cosine_similarity(&vecs[0], &vecs[2]);
        assert!(close > far);
        assert!(close > 0.35);
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero() {
        let model = EmbeddingModel::hashed(16);
        let v = model.embed("  ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(EmbeddingModel::cosine_similarity(&v, &v), 0.0);
    }

    #[tokio::test]
    async fn large_batches_match_inline_hashing() {
        let model = EmbeddingModel::hashed(32);
        let texts: Vec<String> = (0..BLOCKING_BATCH + 3).map(|i| format!("section {i} text")).collect();
        let batch = model
            .embed_batch(texts.iter().map(String::as_str).collect())
            .await
            .unwrap();
        assert_eq!(batch.len(), texts.len());
        assert_eq!(batch[5], hashed_embed(&texts[5], 32));
    }

    #[tokio::test]
    async fn stub_backend_batches_once() {
        let model = EmbeddingModel::stub(8);
        let out = model.embed_batch(vec!["a", "b", "a"]).await.unwrap();
        assert_eq!(model.stub_batch_calls(), Some(1));
        assert_eq!(out[0], out[2]);
        assert!((norm(&out[1]) - 1.0).abs() < 1e-5);
        assert_eq!(EmbeddingModel::hashed(8).stub_batch_calls(), None);
    }

    #[cfg(feature = "onnx")]
    #[tokio::test]
    async fn onnx_mode_defers_loading_until_first_embedding() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EmbeddingConfig {
            model_dir: Some(dir.path().to_path_buf()),
            ..EmbeddingConfig::default()
        };

        let model = EmbeddingModel::with_mode(EmbeddingMode::Onnx, &config).unwrap();
        assert_eq!(model.mode(), EmbeddingMode::Onnx);
        assert_eq!(model.dimension(), DEFAULT_DIMENSION);

        let err = model.embed("Driver license means a credential.").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains(DEFAULT_MODEL), "{message}");
        assert!(message.contains("model.onnx"), "{message}");
    }

    #[cfg(feature = "onnx")]
    #[tokio::test]
    #[ignore = "Requires the all-minilm-l6-v2 ONNX export under DOCUSTITCH_MODEL_DIR"]
    async fn sentence_model_links_paraphrases_that_share_no_words() {
        let model = EmbeddingModel::with_mode(EmbeddingMode::Onnx, &EmbeddingConfig::default()).unwrap();
        let vecs = model
            .embed_batch(vec![
                "Driver license means a credential permitting operation of a car.",
                "An operator permit authorizes a person to drive an automobile.",
                "Marine fisheries quota allocation for the northern region.",
            ])
            .await
            .unwrap();
        assert_eq!(vecs[0].len(), DEFAULT_DIMENSION);

        let paraphrase = EmbeddingModel::cosine_similarity(&vecs[0], &vecs[1]);
        let unrelated = EmbeddingModel::cosine_similarity(&vecs[0], &vecs[2]);
        assert!(paraphrase > 0.35, "paraphrase cosine {paraphrase}");
        assert!(paraphrase > unrelated);
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn onnx_mode_needs_the_feature() {
        assert!(EmbeddingModel::with_mode(EmbeddingMode::Onnx, &EmbeddingConfig::default()).is_err());
    }
}
