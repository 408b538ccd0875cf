use crate::embeddings::{normalize, EmbeddingConfig};
use crate::error::{Result, VectorStoreError};
use ndarray::{Array2, ArrayD, ArrayView2, ArrayView3, Ix2, Ix3, ShapeError};
use once_cell::sync::OnceCell;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

fn embedding_error(message: impl Into<String>) -> VectorStoreError {
    VectorStoreError::EmbeddingError(message.into())
}

/// `sentence-transformers/all-MiniLM-L6-v2` -> `all-minilm-l6-v2`
pub(crate) fn model_id(raw: &str) -> String {
    raw.trim()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// On-disk assets of one sentence model
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModelFiles {
    pub id: String,
    pub root: PathBuf,
    pub onnx: PathBuf,
    pub tokenizer: PathBuf,
}

impl ModelFiles {
    pub(crate) fn locate(model_dir: &Path, model: &str) -> Self {
        let id = model_id(model);
        let root = model_dir.join(&id);
        let onnx = ["model.onnx", "onnx/model.onnx"]
            .iter()
            .map(|rel| root.join(rel))
            .find(|path| path.is_file())
            .unwrap_or_else(|| root.join("model.onnx"));
        let tokenizer = root.join("tokenizer.json");
        Self {
            id,
            root,
            onnx,
            tokenizer,
        }
    }
}

/// ONNX session created on first use and shared by later batches
pub(crate) struct LazyOnnx {
    files: ModelFiles,
    dimension: usize,
    max_length: usize,
    max_batch: usize,
    backend: OnceCell<OnnxBackend>,
}

impl LazyOnnx {
    pub(crate) fn new(config: &EmbeddingConfig) -> Self {
        Self {
            files: ModelFiles::locate(&config.resolved_model_dir(), &config.model),
            dimension: config.dimension,
            max_length: config.max_length,
            max_batch: config.max_batch,
            backend: OnceCell::new(),
        }
    }

    pub(crate) fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let backend = self
            .backend
            .get_or_try_init(|| OnnxBackend::load(&self.files, self.max_length))?;
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.max_batch) {
            out.extend(backend.embed_chunk(chunk, self.dimension)?);
        }
        Ok(out)
    }
}

struct OnnxBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl OnnxBackend {
    fn load(files: &ModelFiles, max_length: usize) -> Result<Self> {
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        for path in [&files.onnx, &files.tokenizer] {
            if !path.is_file() {
                return Err(embedding_error(format!(
                    "Model '{}' is missing {}. Put the ONNX export and tokenizer.json under {} \
                     (or set DOCUSTITCH_MODEL_DIR), or use --embed-mode hashed",
                    files.id,
                    path.display(),
                    files.root.display()
                )));
            }
        }

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| embedding_error(format!("Tokenizer load failed: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| embedding_error(format!("Tokenizer truncation failed: {e}")))?;

        let threads = std::thread::available_parallelism().map_or(1, |n| n.get().min(4));
        let session = Session::builder()
            .map_err(|e| embedding_error(format!("ONNX session builder failed: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| embedding_error(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(threads)
            .map_err(|e| embedding_error(format!("Failed to set ORT intra threads: {e}")))?
            .commit_from_file(&files.onnx)
            .map_err(|e| {
                embedding_error(format!(
                    "Failed to load ONNX model {}: {e}",
                    files.onnx.display()
                ))
            })?;

        log::info!(
            "Loaded ONNX model '{}' from {} ({} threads)",
            files.id,
            files.onnx.display(),
            threads
        );
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn embed_chunk(&self, texts: &[String], dimension: usize) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| embedding_error(format!("Tokenization failed: {e}")))?;
        let Some(seq_len) = encodings.first().map(Encoding::len) else {
            return Ok(Vec::new());
        };

        let mask = token_matrix(&encodings, seq_len, Encoding::get_attention_mask);
        let mut available: HashMap<&str, DynTensor> = HashMap::new();
        available.insert(
            "input_ids",
            tensor(token_matrix(&encodings, seq_len, Encoding::get_ids))?,
        );
        available.insert(
            "token_type_ids",
            tensor(token_matrix(&encodings, seq_len, Encoding::get_type_ids))?,
        );
        available.insert("attention_mask", tensor(mask.clone())?);

        let output = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| embedding_error("ONNX session lock poisoned"))?;

            let mut feed: HashMap<String, DynTensor> = HashMap::new();
            for input in &session.inputs {
                let value = available.remove(input.name.as_str()).ok_or_else(|| {
                    embedding_error(format!("Unsupported ONNX input '{}'", input.name))
                })?;
                feed.insert(input.name.clone(), value);
            }

            let outputs = session
                .run(SessionInputs::from(feed))
                .map_err(|e| embedding_error(format!("ONNX forward failed: {e}")))?;
            if outputs.len() == 0 {
                return Err(embedding_error("ONNX returned no outputs"));
            }
            let array = outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| embedding_error(format!("Failed to decode ONNX output: {e}")))?
                .to_owned();
            drop(outputs);
            drop(session);
            array
        };

        sentence_embeddings(output, mask.view(), dimension)
    }
}

/// One row per encoding, `seq_len` columns, zero-filled past the encoding
fn token_matrix(
    encodings: &[Encoding],
    seq_len: usize,
    field: fn(&Encoding) -> &[u32],
) -> Array2<i64> {
    Array2::from_shape_fn((encodings.len(), seq_len), |(row, col)| {
        field(&encodings[row])
            .get(col)
            .map_or(0, |value| i64::from(*value))
    })
}

fn tensor(values: Array2<i64>) -> Result<DynTensor> {
    Ok(Tensor::from_array(values.into_dyn())
        .map_err(|e| embedding_error(format!("Tensor build failed: {e}")))?
        .upcast())
}

fn shape_error(error: ShapeError) -> VectorStoreError {
    embedding_error(format!("Bad ONNX output shape: {error}"))
}

/// Pooled (`[batch, hidden]`) outputs pass through; token outputs
/// (`[batch, seq, hidden]`) are mean-pooled over the attention mask. Every
/// row is checked against `dimension` and L2-normalized.
pub(crate) fn sentence_embeddings(
    output: ArrayD<f32>,
    mask: ArrayView2<'_, i64>,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let rows: Vec<Vec<f32>> = match output.ndim() {
        2 => output
            .into_dimensionality::<Ix2>()
            .map_err(shape_error)?
            .outer_iter()
            .map(|row| row.to_vec())
            .collect(),
        3 => mean_pool(output.into_dimensionality::<Ix3>().map_err(shape_error)?.view(), mask),
        _ => {
            return Err(embedding_error(format!(
                "Unexpected ONNX output dims: {:?}",
                output.shape()
            )))
        }
    };

    rows.into_iter()
        .map(|mut row| {
            if row.len() != dimension {
                return Err(VectorStoreError::InvalidDimension {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            normalize(&mut row);
            Ok(row)
        })
        .collect()
}

/// Average of the token vectors whose mask entry is non-zero
pub(crate) fn mean_pool(hidden: ArrayView3<'_, f32>, mask: ArrayView2<'_, i64>) -> Vec<Vec<f32>> {
    hidden
        .outer_iter()
        .zip(mask.outer_iter())
        .map(|(tokens, row)| {
            let weights = row.mapv(|m| if m == 0 { 0.0f32 } else { 1.0 });
            let count = weights.sum();
            let summed = tokens.t().dot(&weights);
            if count > 0.0 {
                (summed / count).to_vec()
            } else {
                summed.to_vec()
            }
        })
        .collect()
}
