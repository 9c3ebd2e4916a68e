/// ONNX Runtime embedder for sentence-transformer exports.
///
/// Texts are tokenized, padded into batches of up to [`BATCH_SIZE`] and run
/// through the model in one call per batch. Each row of `last_hidden_state` is
/// mean-pooled under its attention mask and L2-normalized.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::tokenizer::{BertTokenizer, TokenBatch};
use super::{Embedder, EmbedderError};

/// Texts per inference call during ingestion.
pub const BATCH_SIZE: usize = 32;

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`. `dimensions`
    /// must equal the model's hidden size; this is checked on every run.
    pub fn new(model_dir: &Path, dimensions: usize) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");
        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        let load_err = |stage: &str, e: ort::Error| {
            EmbedderError::ModelLoadFailed(format!("{stage}: {e}"))
        };
        let session = Session::builder()
            .map_err(|e| load_err("session builder", e))?
            .with_intra_threads(4)
            .map_err(|e| load_err("thread config", e))?
            .commit_from_file(&model_path)
            .map_err(|e| load_err("model load", e))?;

        let tokenizer = BertTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbedderError::TokenizerError(format!("{e:#}")))?;

        info!(
            "Loaded {} (vocab size {}, {} dimensions)",
            model_path.display(),
            tokenizer.vocab_size(),
            dimensions
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }

    fn run_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let batch = self
            .tokenizer
            .tokenize_batch(texts)
            .map_err(|e| EmbedderError::TokenizerError(format!("{e:#}")))?;
        if batch.batch_size == 0 {
            return Ok(Vec::new());
        }
        let shape = [batch.batch_size, batch.seq_len];

        let tensor_err =
            |name: &str, e: ort::Error| EmbedderError::InferenceFailed(format!("{name}: {e}"));
        let input_ids = Tensor::from_array((shape, batch.input_ids.clone()))
            .map_err(|e| tensor_err("input_ids", e))?;
        let attention_mask = Tensor::from_array((shape, batch.attention_mask.clone()))
            .map_err(|e| tensor_err("attention_mask", e))?;
        let token_type_ids = Tensor::from_array((shape, vec![0i64; batch.input_ids.len()]))
            .map_err(|e| tensor_err("token_type_ids", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
            .map_err(|e| tensor_err("run", e))?;

        // last_hidden_state: [batch, seq_len, hidden]
        let (out_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| tensor_err("output", e))?;
        let hidden_size = out_shape.last().copied().unwrap_or_default() as usize;
        if hidden_size != self.dimensions {
            return Err(EmbedderError::InferenceFailed(format!(
                "model produced {hidden_size} dimensions, configured for {}",
                self.dimensions
            )));
        }

        debug!("Embedded batch of {} ({} tokens)", batch.batch_size, batch.seq_len);
        Ok(mean_pool_batch(hidden, &batch, hidden_size)
            .into_iter()
            .map(|v| l2_normalize(&v))
            .collect())
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.run_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty model output".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for group in texts.chunks(BATCH_SIZE) {
            vectors.extend(self.run_batch(group)?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Mean of each row's hidden states over its unmasked tokens.
///
/// `hidden` is flat `[batch_size, seq_len, hidden_size]`.
fn mean_pool_batch(hidden: &[f32], batch: &TokenBatch, hidden_size: usize) -> Vec<Vec<f32>> {
    (0..batch.batch_size)
        .map(|row| {
            let mut pooled = vec![0.0f32; hidden_size];
            let mut tokens = 0.0f32;
            for t in 0..batch.seq_len {
                let mask = batch.attention_mask[row * batch.seq_len + t] as f32;
                if mask == 0.0 {
                    continue;
                }
                tokens += mask;
                let offset = (row * batch.seq_len + t) * hidden_size;
                for (acc, h) in pooled.iter_mut().zip(&hidden[offset..offset + hidden_size]) {
                    *acc += h * mask;
                }
            }
            if tokens > 0.0 {
                for v in &mut pooled {
                    *v /= tokens;
                }
            }
            pooled
        })
        .collect()
}

fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return vec.to_vec();
    }
    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter().map(|v| v * inv_norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(mask: Vec<i64>, batch_size: usize, seq_len: usize) -> TokenBatch {
        TokenBatch {
            input_ids: vec![1; mask.len()],
            attention_mask: mask,
            batch_size,
            seq_len,
        }
    }

    #[test]
    fn test_l2_normalize() {
        let normed = l2_normalize(&[3.0, 4.0]);
        assert!((normed[0] - 0.6).abs() < 1e-6);
        assert!((normed[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_mean_pool_ignores_padding() {
        // 2 rows, 2 tokens, hidden_size=2; second token of row 1 is padding
        let hidden = vec![1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 99.0, 99.0];
        let pooled = mean_pool_batch(&hidden, &batch(vec![1, 1, 1, 0], 2, 2), 2);
        assert_eq!(pooled, vec![vec![2.0, 3.0], vec![10.0, 20.0]]);
    }

    #[test]
    fn test_mean_pool_fully_masked_row_is_zero() {
        let hidden = vec![5.0, 5.0];
        let pooled = mean_pool_batch(&hidden, &batch(vec![0], 1, 1), 2);
        assert_eq!(pooled, vec![vec![0.0, 0.0]]);
    }

    #[test]
    fn test_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxEmbedder::new(dir.path(), 384).err().unwrap();
        assert!(matches!(err, EmbedderError::ModelLoadFailed(_)));
    }

    /// Requires the downloaded model files.
    #[test]
    #[ignore]
    fn test_onnx_batch_matches_single() {
        let model_dir = crate::embedder::download::default_model_dir();
        if !model_dir.join("model.onnx").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let embedder = OnnxEmbedder::new(&model_dir, 384).unwrap();
        let single = embedder.embed("Hello, world!").unwrap();
        let batch = embedder
            .embed_batch(&["Hello, world!", "a much longer sentence that forces padding"])
            .unwrap();

        assert_eq!(single.len(), 384);
        for (a, b) in single.iter().zip(&batch[0]) {
            assert!((a - b).abs() < 1e-4, "padding must not change the embedding");
        }
    }
}
